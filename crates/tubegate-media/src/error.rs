//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while resolving or streaming media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(PathBuf),

    #[error("yt-dlp not found: {0}")]
    YtDlpNotFound(PathBuf),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        status: Option<u16>,
    },

    #[error("Source stream failed: {message}")]
    SourceFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Transcode failed: {message}")]
    TranscodeFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Transcoder produced no audio")]
    EmptyOutput,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an upstream failure error.
    pub fn upstream(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Upstream {
            message: message.into(),
            status,
        }
    }

    /// Create a source failure error.
    pub fn source_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::SourceFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a transcode failure error.
    pub fn transcode_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::TranscodeFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the failure means the video does not exist or is not viewable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MediaError::VideoNotFound(_))
    }

    /// Stable short code for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            MediaError::FfmpegNotFound(_) | MediaError::YtDlpNotFound(_) => "missing_binary",
            MediaError::VideoNotFound(_) => "not_found",
            MediaError::Upstream { .. } | MediaError::Http(_) => "upstream",
            MediaError::SourceFailed { .. } => "source",
            MediaError::TranscodeFailed { .. } | MediaError::EmptyOutput => "transcode",
            MediaError::Timeout(_) => "timeout",
            MediaError::Io(_) => "io",
            MediaError::JsonParse(_) => "parse",
            MediaError::Internal(_) => "internal",
        }
    }
}
