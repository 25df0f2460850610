use std::path::Path;

use tracing::{debug, info};

use crate::config::{Language, PipelineConfig};
use crate::download::MediaAcquirer;
use crate::error::{Error, Result};
use crate::segment::{AudioSegmenter, FfmpegSegmenter};
use crate::temp::ScratchDir;
use crate::transcribe::{SpeechToText, WhisperApiClient};
use crate::types::{AcquiredAudio, MediaSource, TranscribeMode, Transcript};

/// The transcription pipeline: audio in, one ordered transcript out.
///
/// Flow: acquire the audio (local path or remote URL), pick a mode by file
/// size, then either upload the whole file once or segment it and
/// transcribe the chunks strictly in order. Everything the pipeline writes
/// to disk lives in a per-invocation [`ScratchDir`] that is removed when
/// the invocation ends, successfully or not.
///
/// Generic over the segmenter and the speech-to-text client so both can be
/// substituted in tests; production code uses [`Pipeline::new`].
pub struct Pipeline<S = FfmpegSegmenter, T = WhisperApiClient> {
    config: PipelineConfig,
    acquirer: MediaAcquirer,
    segmenter: S,
    client: T,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let acquirer = MediaAcquirer::new(&config);
        let segmenter = FfmpegSegmenter::new(config.chunk_seconds, config.segment_timeout);
        let client = WhisperApiClient::new(&config);
        Self {
            config,
            acquirer,
            segmenter,
            client,
        }
    }
}

impl<S: AudioSegmenter, T: SpeechToText> Pipeline<S, T> {
    pub fn with_components(
        config: PipelineConfig,
        acquirer: MediaAcquirer,
        segmenter: S,
        client: T,
    ) -> Self {
        Self {
            config,
            acquirer,
            segmenter,
            client,
        }
    }

    /// Transcribe a local audio file.
    pub async fn run_local(&self, path: impl AsRef<Path>, language: &Language) -> Result<Transcript> {
        self.run(
            MediaSource::LocalFile {
                path: path.as_ref().to_path_buf(),
            },
            language,
        )
        .await
    }

    /// Download and transcribe a remote video or audio URL.
    pub async fn run_url(&self, url: &str, language: &Language) -> Result<Transcript> {
        self.run(
            MediaSource::RemoteUrl {
                url: url.to_string(),
            },
            language,
        )
        .await
    }

    /// Run the full pipeline for one source.
    pub async fn run(&self, source: MediaSource, language: &Language) -> Result<Transcript> {
        let scratch = ScratchDir::create()?;

        let audio = self.acquire(source, &scratch).await?;

        let mode = if audio.size_bytes > self.config.segment_threshold_bytes {
            TranscribeMode::Segmented
        } else {
            TranscribeMode::Single
        };
        info!(
            path = %audio.path.display(),
            size = audio.size_bytes,
            mode = mode.as_str(),
            "audio ready"
        );

        let text = match mode {
            TranscribeMode::Single => self.transcribe_single(&audio, language).await?,
            TranscribeMode::Segmented => {
                self.transcribe_segmented(&audio, language, &scratch).await?
            }
        };

        Ok(Transcript { text, mode })
    }

    async fn acquire(&self, source: MediaSource, scratch: &ScratchDir) -> Result<AcquiredAudio> {
        match source {
            MediaSource::LocalFile { path } => {
                if !path.is_file() {
                    return Err(Error::AudioNotFound { path });
                }
                let size_bytes = tokio::fs::metadata(&path).await?.len();
                info!(path = %path.display(), size = size_bytes, "using local audio file");
                Ok(AcquiredAudio { path, size_bytes })
            }
            MediaSource::RemoteUrl { url } => self.acquirer.acquire(&url, scratch.path()).await,
        }
    }

    /// Upload the whole file in one call. The API's text is returned
    /// untouched.
    async fn transcribe_single(&self, audio: &AcquiredAudio, language: &Language) -> Result<String> {
        let bytes = tokio::fs::read(&audio.path).await?;
        self.client
            .transcribe(
                bytes,
                upload_name(&audio.path),
                language,
                self.config.single_shot_timeout,
            )
            .await
    }

    /// Segment the file and transcribe the chunks one at a time, in index
    /// order, with a pause between consecutive calls. Any chunk failure
    /// aborts the whole run; a partial transcript is never returned.
    async fn transcribe_segmented(
        &self,
        audio: &AcquiredAudio,
        language: &Language,
        scratch: &ScratchDir,
    ) -> Result<String> {
        let chunk_dir = scratch.file_path("chunks");
        tokio::fs::create_dir_all(&chunk_dir).await?;

        let mut chunks = self.segmenter.segment(&audio.path, &chunk_dir).await?;
        chunks.sort_by_key(|c| c.index);
        info!(chunks = chunks.len(), "transcribing chunks in order");

        let mut text = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.chunk_pause).await;
            }
            debug!(chunk = chunk.index, "transcribing chunk");

            let bytes = tokio::fs::read(&chunk.path).await?;
            let part = self
                .client
                .transcribe(
                    bytes,
                    upload_name(&chunk.path),
                    language,
                    self.config.chunk_timeout,
                )
                .await?;

            text.push_str(part.trim());
            text.push('\n');
        }
        Ok(text)
    }
}

fn upload_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio.mp3")
}
