//! Error types for lookups, mirror fetches and the download queue

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Lookup failed for {checksum}: {reason}")]
    LookupFailed { checksum: String, reason: String },

    #[error("No mirror has content {content_id}")]
    MirrorExhausted { content_id: i32 },

    #[error("Failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status: {0}")]
    HttpStatus(StatusCode),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No mirrors configured")]
    NoMirrors,

    #[error("No API credential configured")]
    MissingCredential,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Download task already queued: {0}")]
    DuplicateTask(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DownloadError {
    /// Check if error is retryable
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::HttpStatus(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }

    pub fn lookup_failed(checksum: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LookupFailed {
            checksum: checksum.into(),
            reason: reason.into(),
        }
    }

    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
