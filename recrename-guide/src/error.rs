//! Error types for guide lookups.

use thiserror::Error;

/// Errors returned by a [`GuideService`](crate::GuideService).
#[derive(Error, Debug)]
pub enum GuideError {
    /// The request could not be sent or the response could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The guide answered with a non-success status.
    #[error("Guide returned HTTP {0}")]
    Status(u16),

    /// The response body was not the expected JSON.
    #[error("Failed to parse guide response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The title lookup did not contain the requested series.
    #[error("Title {0} not found")]
    TitleNotFound(u32),
}

impl GuideError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GuideError::Http(_) | GuideError::Status(_))
    }
}

/// Result type for guide operations.
pub type Result<T> = std::result::Result<T, GuideError>;
