use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::AudioChunk;

/// Splits one audio file into ordered bounded-duration chunks on disk.
#[async_trait]
pub trait AudioSegmenter: Send + Sync {
    /// Write chunk files into `work_dir` and return them sorted by name.
    async fn segment(&self, input: &Path, work_dir: &Path) -> Result<Vec<AudioChunk>>;
}

/// ffmpeg-backed segmenter.
///
/// Re-encodes to mono 16 kHz at 64 kbit/s while splitting, which bounds
/// per-chunk upload size without materially hurting speech recognition.
/// Chunk files are named `chunk_NNN.mp3` so lexicographic order equals
/// chronological order for up to 1000 chunks.
pub struct FfmpegSegmenter {
    program: String,
    chunk_seconds: u32,
    deadline: Duration,
}

impl FfmpegSegmenter {
    pub fn new(chunk_seconds: u32, deadline: Duration) -> Self {
        Self {
            program: "ffmpeg".to_string(),
            chunk_seconds,
            deadline,
        }
    }

    /// Use an ffmpeg binary that is not on PATH.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl AudioSegmenter for FfmpegSegmenter {
    async fn segment(&self, input: &Path, work_dir: &Path) -> Result<Vec<AudioChunk>> {
        info!(path = %input.display(), "segmenting audio");

        let pattern = work_dir.join("chunk_%03d.mp3");

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("-y")
            .arg("-nostdin")
            .arg("-i")
            .arg(input)
            .args(["-ac", "1", "-ar", "16000", "-b:a", "64k"])
            .args(["-f", "segment", "-segment_time"])
            .arg(self.chunk_seconds.to_string())
            .arg(&pattern)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.deadline, cmd.output())
            .await
            .map_err(|_| {
                Error::SegmentationFailed(format!(
                    "ffmpeg did not finish within {}s",
                    self.deadline.as_secs()
                ))
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolMissing {
                        tool: "ffmpeg".to_string(),
                    }
                } else {
                    Error::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Limit error message length to avoid dumping huge stderr
            let stderr_truncated: String = stderr.chars().take(1000).collect();
            return Err(Error::SegmentationFailed(stderr_truncated));
        }

        let chunks = collect_chunks(work_dir)?;
        debug!(chunks = chunks.len(), "segmentation complete");
        Ok(chunks)
    }
}

/// Gather `chunk_*` files and sort them so filename order equals
/// chronological order.
fn collect_chunks(dir: &Path) -> Result<Vec<AudioChunk>> {
    let mut chunks = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_file() || !name.starts_with("chunk_") {
            continue;
        }
        if let Some(index) = parse_chunk_index(name) {
            chunks.push(AudioChunk { path, index });
        }
    }

    if chunks.is_empty() {
        return Err(Error::NoChunksProduced);
    }

    chunks.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(chunks)
}

/// Parse the zero-padded index out of a `chunk_NNN.mp3` filename.
fn parse_chunk_index(name: &str) -> Option<u32> {
    name.strip_prefix("chunk_")?.split('.').next()?.parse().ok()
}
