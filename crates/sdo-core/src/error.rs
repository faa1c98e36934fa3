use chrono::{DateTime, Utc};
use thiserror::Error;

/// Outcome classes of a single remote fetch.
///
/// `NotFound` is a definitive answer from the remote, not a failure: callers
/// use it to advance to the next repository without reporting an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Rate limited by {url}")]
    RateLimited {
        url: String,
        reset_at: Option<DateTime<Utc>>,
    },

    #[error("Network error for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum SdoError {
    // Remote errors
    #[error(transparent)]
    Fetch(#[from] FetchError),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid repository name: {0}")]
    InvalidRepository(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    // Packaging errors
    #[error("Packaging failed: {0}")]
    Packaging(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<zip::result::ZipError> for SdoError {
    fn from(err: zip::result::ZipError) -> Self {
        SdoError::Packaging(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SdoError>;
