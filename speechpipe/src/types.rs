use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the audio comes from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// A file already on local disk, owned by the caller.
    LocalFile { path: PathBuf },
    /// A video/audio page URL resolved through the external downloader.
    RemoteUrl { url: String },
}

/// A local audio file ready for transcription.
///
/// Owned by the pipeline invocation that produced it; it lives inside that
/// invocation's scratch directory and disappears with it.
#[derive(Debug, Clone)]
pub struct AcquiredAudio {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// One bounded-duration slice of a longer recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub path: PathBuf,
    /// Zero-based position in the recording, parsed from the chunk filename.
    pub index: u32,
}

/// Record of one download attempt, kept for diagnostics only.
#[derive(Debug, Clone)]
pub struct FallbackAttempt {
    pub strategy: &'static str,
    pub succeeded: bool,
    pub output: String,
}

/// How a transcript was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscribeMode {
    /// Whole file in one API call.
    Single,
    /// Chunked and transcribed chunk by chunk.
    Segmented,
}

impl TranscribeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscribeMode::Single => "single",
            TranscribeMode::Segmented => "segmented",
        }
    }
}

/// Complete transcription result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// In segmented mode: per-chunk texts, each trimmed and newline-terminated,
    /// in chunk order. In single mode: the API's text verbatim.
    pub text: String,
    pub mode: TranscribeMode,
}

impl Transcript {
    /// Serialize to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
