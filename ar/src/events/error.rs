//! Event decoding errors

use thiserror::Error;

/// Reasons a wire message is not a valid `StreamEvent`
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Invalid {event_type} payload: {source}")]
    InvalidPayload {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Progress {0} outside 0..=100")]
    ProgressOutOfRange(i64),
}
