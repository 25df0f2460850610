use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default base URL of the transcription API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default transcription model identifier.
pub const DEFAULT_MODEL: &str = "whisper-1";

/// Inputs at or below this size are transcribed in a single API call.
pub const DEFAULT_SEGMENT_THRESHOLD_BYTES: u64 = 20 * 1024 * 1024;

/// A language hint for the transcription API.
///
/// The API accepts short ISO codes ("en", "de", "ja") and detects the
/// language itself when none is given. Only the shape of the code is
/// validated here; the API owns the actual language list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    /// Let the API detect the language.
    Auto,
    /// A concrete language code (e.g. "en", "de").
    Code(String),
}

impl Language {
    /// Parse a hint. Empty and "auto" mean detection; anything else must
    /// look like a 2-3 letter ISO code.
    pub fn new(lang: &str) -> Result<Self> {
        let lower = lang.trim().to_lowercase();
        if lower.is_empty() || lower == "auto" {
            return Ok(Language::Auto);
        }
        if (2..=3).contains(&lower.len()) && lower.chars().all(|c| c.is_ascii_lowercase()) {
            Ok(Language::Code(lower))
        } else {
            Err(Error::UnsupportedLanguage(lang.to_string()))
        }
    }

    /// Get the language code, or None for Auto.
    pub fn code(&self) -> Option<&str> {
        match self {
            Language::Auto => None,
            Language::Code(code) => Some(code),
        }
    }

    /// Whether this is auto-detection mode.
    pub fn is_auto(&self) -> bool {
        matches!(self, Language::Auto)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Auto => write!(f, "auto"),
            Language::Code(code) => write!(f, "{code}"),
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Auto
    }
}

/// Pipeline configuration, passed in by the caller at construction time.
///
/// The policy knobs (threshold, chunk length, pause, timeouts) default to
/// values tuned for the upstream API's payload and rate limits; they are
/// configurable rather than architectural.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bearer token for the transcription API.
    pub api_key: String,
    pub api_base_url: String,
    pub model: String,
    /// Netscape-format cookies file for the downloader's authenticated retry.
    pub cookies_file: Option<PathBuf>,
    /// Raw Netscape-format cookie data, staged to a scratch file at download
    /// time. `cookies_file` wins when both are set.
    pub cookies_content: Option<String>,
    /// Base URL of a stream-resolution mirror, the downloader's last resort.
    pub mirror_base_url: Option<String>,
    /// Inputs larger than this are segmented; smaller go up in one call.
    pub segment_threshold_bytes: u64,
    /// Length of each audio chunk in seconds.
    pub chunk_seconds: u32,
    /// Pause between consecutive chunk transcription calls.
    pub chunk_pause: Duration,
    /// Deadline for a single-shot transcription call.
    pub single_shot_timeout: Duration,
    /// Deadline for one chunk's transcription call.
    pub chunk_timeout: Duration,
    /// Deadline for one downloader invocation.
    pub download_timeout: Duration,
    /// Deadline for the segmentation run.
    pub segment_timeout: Duration,
}

impl PipelineConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            cookies_file: None,
            cookies_content: None,
            mirror_base_url: None,
            segment_threshold_bytes: DEFAULT_SEGMENT_THRESHOLD_BYTES,
            chunk_seconds: 600,
            chunk_pause: Duration::from_millis(500),
            single_shot_timeout: Duration::from_secs(120),
            chunk_timeout: Duration::from_secs(180),
            download_timeout: Duration::from_secs(900),
            segment_timeout: Duration::from_secs(600),
        }
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn cookies_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_file = Some(path.into());
        self
    }

    pub fn cookies_content(mut self, content: impl Into<String>) -> Self {
        self.cookies_content = Some(content.into());
        self
    }

    pub fn mirror_base_url(mut self, url: impl Into<String>) -> Self {
        self.mirror_base_url = Some(url.into());
        self
    }

    pub fn segment_threshold_bytes(mut self, bytes: u64) -> Self {
        self.segment_threshold_bytes = bytes;
        self
    }

    pub fn chunk_seconds(mut self, seconds: u32) -> Self {
        self.chunk_seconds = seconds;
        self
    }

    pub fn chunk_pause(mut self, pause: Duration) -> Self {
        self.chunk_pause = pause;
        self
    }

    pub fn single_shot_timeout(mut self, timeout: Duration) -> Self {
        self.single_shot_timeout = timeout;
        self
    }

    pub fn chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn segment_timeout(mut self, timeout: Duration) -> Self {
        self.segment_timeout = timeout;
        self
    }
}
