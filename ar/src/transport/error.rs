//! Transport error types

use thiserror::Error;

/// Errors that can occur while submitting a run or streaming its events
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stream connection failed: {0}")]
    Stream(String),

    #[error("Stream closed before the run finished")]
    StreamClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// True for failures of a live event channel, as opposed to submission
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, TransportError::Stream(_) | TransportError::StreamClosed)
    }

    /// HTTP status, if the backend answered with one
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::ApiError { status, .. } => Some(*status),
            TransportError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
