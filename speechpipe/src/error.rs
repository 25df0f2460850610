use std::path::PathBuf;

/// All errors that can occur in speechpipe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("required tool not found on PATH: {tool}")]
    ToolMissing { tool: String },

    #[error("invalid URL (must start with http:// or https://): {0}")]
    InvalidUrl(String),

    #[error("unsupported language hint: \"{0}\" — pass an ISO code like \"en\" or \"auto\"")]
    UnsupportedLanguage(String),

    #[error("audio file not found: {path}")]
    AudioNotFound { path: PathBuf },

    #[error("could not download audio: all {attempts} strategies failed")]
    AcquisitionFailed { attempts: usize, output: String },

    #[error("the source requires a signed-in session to download")]
    AuthenticationRequired { output: String },

    #[error("audio segmentation failed: {0}")]
    SegmentationFailed(String),

    #[error("segmentation produced no chunks — input may be empty or corrupt")]
    NoChunksProduced,

    #[error("transcription API returned status {status}")]
    TranscriptionFailed { status: u16, body: String },

    #[error("could not parse transcription API response: {0}")]
    ResponseParseFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of user-facing failure categories.
///
/// Callers (an HTTP layer, a CLI) present one of these as the primary
/// message and map each to a distinct status/exit code. Raw tool and API
/// output stays in [`Error::details`], never in the primary message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A required external executable is missing.
    MissingDependency,
    /// The source demands sign-in; configuring cookies may help.
    AuthenticationRequired,
    /// The remote transcription call failed or returned garbage.
    TranscriptionFailed,
    /// The caller passed something unusable (bad URL, missing file).
    InvalidInput,
    /// Everything else: tool failures, I/O, network.
    Internal,
}

impl ErrorCategory {
    /// Stable one-line message for this category.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCategory::MissingDependency => "a required external tool is not installed",
            ErrorCategory::AuthenticationRequired => {
                "the source requires authentication to download"
            }
            ErrorCategory::TranscriptionFailed => "transcription failed",
            ErrorCategory::InvalidInput => "invalid input",
            ErrorCategory::Internal => "internal error",
        }
    }
}

impl Error {
    /// Map this error onto the closed user-facing category set.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ToolMissing { .. } => ErrorCategory::MissingDependency,
            Error::AuthenticationRequired { .. } => ErrorCategory::AuthenticationRequired,
            Error::TranscriptionFailed { .. } | Error::ResponseParseFailed(_) => {
                ErrorCategory::TranscriptionFailed
            }
            Error::InvalidUrl(_) | Error::UnsupportedLanguage(_) | Error::AudioNotFound { .. } => {
                ErrorCategory::InvalidInput
            }
            Error::AcquisitionFailed { .. }
            | Error::SegmentationFailed(_)
            | Error::NoChunksProduced
            | Error::Io(_)
            | Error::Http(_) => ErrorCategory::Internal,
        }
    }

    /// Optional remediation hint to show alongside the category message.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::ToolMissing { tool } if tool == "yt-dlp" => {
                Some("install with: pip install yt-dlp")
            }
            Error::ToolMissing { tool } if tool == "ffmpeg" => {
                Some("install with: apt install ffmpeg")
            }
            Error::AuthenticationRequired { .. } => {
                Some("provide a cookies file (YTDLP_COOKIES) and retry")
            }
            _ => None,
        }
    }

    /// Raw diagnostic text (tool output, API response body), if any.
    pub fn details(&self) -> Option<&str> {
        match self {
            Error::AcquisitionFailed { output, .. } => Some(output),
            Error::AuthenticationRequired { output } => Some(output),
            Error::SegmentationFailed(stderr) => Some(stderr),
            Error::TranscriptionFailed { body, .. } => Some(body),
            Error::ResponseParseFailed(detail) => Some(detail),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_tool_missing() {
        let e = Error::ToolMissing {
            tool: "yt-dlp".into(),
        };
        assert_eq!(e.to_string(), "required tool not found on PATH: yt-dlp");
    }

    #[test]
    fn test_error_display_audio_not_found() {
        let e = Error::AudioNotFound {
            path: PathBuf::from("/tmp/audio.mp3"),
        };
        assert!(e.to_string().contains("/tmp/audio.mp3"));
    }

    #[test]
    fn test_error_display_transcription_failed() {
        let e = Error::TranscriptionFailed {
            status: 429,
            body: "rate limited".into(),
        };
        assert!(e.to_string().contains("429"));
        // body is diagnostics, not part of the primary message
        assert!(!e.to_string().contains("rate limited"));
        assert_eq!(e.details(), Some("rate limited"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn test_category_missing_dependency() {
        let e = Error::ToolMissing {
            tool: "ffmpeg".into(),
        };
        assert_eq!(e.category(), ErrorCategory::MissingDependency);
        assert_eq!(e.hint(), Some("install with: apt install ffmpeg"));
    }

    #[test]
    fn test_category_auth_distinct_from_acquisition() {
        let auth = Error::AuthenticationRequired {
            output: "sign in to confirm".into(),
        };
        let acq = Error::AcquisitionFailed {
            attempts: 7,
            output: "403".into(),
        };
        assert_eq!(auth.category(), ErrorCategory::AuthenticationRequired);
        assert_eq!(acq.category(), ErrorCategory::Internal);
        assert_ne!(auth.category(), acq.category());
    }

    #[test]
    fn test_category_parse_failure_counts_as_transcription() {
        let e = Error::ResponseParseFailed("expected value at line 1".into());
        assert_eq!(e.category(), ErrorCategory::TranscriptionFailed);
    }

    #[test]
    fn test_details_never_dropped() {
        let e = Error::AcquisitionFailed {
            attempts: 6,
            output: "[web-m4a] ERROR: fragment 403".into(),
        };
        assert_eq!(e.details(), Some("[web-m4a] ERROR: fragment 403"));
    }

    #[test]
    fn test_category_messages_are_short() {
        for cat in [
            ErrorCategory::MissingDependency,
            ErrorCategory::AuthenticationRequired,
            ErrorCategory::TranscriptionFailed,
            ErrorCategory::InvalidInput,
            ErrorCategory::Internal,
        ] {
            assert!(cat.message().len() < 80);
        }
    }
}
