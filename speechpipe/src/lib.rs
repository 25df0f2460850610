//! Long-audio transcription: a URL or local file in, one ordered
//! transcript out.
//!
//! The pipeline resolves its input to a local audio file (downloading
//! remote URLs with `yt-dlp` through a ladder of fallback strategies),
//! then transcribes it through a Whisper-style HTTP API. Files above a
//! size threshold are split into bounded chunks with `ffmpeg` and
//! transcribed strictly in order, one chunk at a time; the result is a
//! single transcript either way. Every intermediate file lives in a
//! per-invocation scratch directory that is removed on success, failure
//! and cancellation alike.
//!
//! # Quick start
//!
//! ```no_run
//! use speechpipe::{transcribe_url, PipelineConfig};
//!
//! # async fn run() -> speechpipe::Result<()> {
//! let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
//! let config = PipelineConfig::new(api_key);
//!
//! let transcript = transcribe_url("https://youtu.be/dQw4w9WgXcQ", &config).await?;
//! println!("{}", transcript.text);
//! # Ok(())
//! # }
//! ```
//!
//! # External tools
//!
//! `yt-dlp` (URL downloads) and `ffmpeg` (segmentation) are invoked as
//! subprocesses and must be installed separately. A missing tool surfaces
//! as [`Error::ToolMissing`] before any work is done.

use std::path::Path;

pub mod config;
pub mod download;
pub mod error;
pub mod pipeline;
pub mod segment;
pub mod temp;
pub mod transcribe;
pub mod types;

pub use config::{
    Language, PipelineConfig, DEFAULT_API_BASE_URL, DEFAULT_MODEL, DEFAULT_SEGMENT_THRESHOLD_BYTES,
};
pub use download::{MediaAcquirer, SystemRunner, ToolOutput, ToolRunner};
pub use error::{Error, ErrorCategory, Result};
pub use pipeline::Pipeline;
pub use segment::{AudioSegmenter, FfmpegSegmenter};
pub use temp::{ScratchDir, ScratchFile};
pub use transcribe::{SpeechToText, WhisperApiClient};
pub use types::{
    AcquiredAudio, AudioChunk, FallbackAttempt, MediaSource, TranscribeMode, Transcript,
};

/// Transcribe a local audio file, letting the API detect the language.
pub async fn transcribe_file(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<Transcript> {
    Pipeline::new(config.clone())
        .run_local(path, &Language::Auto)
        .await
}

/// Transcribe a local audio file with an explicit language hint.
pub async fn transcribe_file_with_language(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
    language: &Language,
) -> Result<Transcript> {
    Pipeline::new(config.clone()).run_local(path, language).await
}

/// Download a remote URL and transcribe its audio, letting the API detect
/// the language.
pub async fn transcribe_url(url: &str, config: &PipelineConfig) -> Result<Transcript> {
    Pipeline::new(config.clone())
        .run_url(url, &Language::Auto)
        .await
}

/// Download a remote URL and transcribe its audio with an explicit
/// language hint.
pub async fn transcribe_url_with_language(
    url: &str,
    config: &PipelineConfig,
    language: &Language,
) -> Result<Transcript> {
    Pipeline::new(config.clone()).run_url(url, language).await
}
