//! JSON wire representation and payload validation

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::EventError;
use super::types::{EventKind, StreamEvent};
use crate::domain::RunResult;

/// Untyped envelope: the discriminant plus a free-form payload
#[derive(Debug, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct LogData {
    message: String,
}

#[derive(Deserialize)]
struct OutputData {
    #[serde(alias = "text")]
    content: String,
}

#[derive(Deserialize)]
struct ProgressData {
    progress: i64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(alias = "message")]
    error: String,
}

#[derive(Deserialize)]
struct CompleteData {
    result: RunResult,
}

fn payload<T: DeserializeOwned>(event_type: &'static str, data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|source| EventError::InvalidPayload { event_type, source })
}

impl TryFrom<WireEvent> for StreamEvent {
    type Error = EventError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let kind = match wire.event_type.as_str() {
            "log" => {
                let data: LogData = payload("log", wire.data)?;
                EventKind::Log { message: data.message }
            }
            "output" => {
                let data: OutputData = payload("output", wire.data)?;
                EventKind::Output { content: data.content }
            }
            "progress" => {
                let data: ProgressData = payload("progress", wire.data)?;
                let progress = u8::try_from(data.progress)
                    .ok()
                    .filter(|p| *p <= 100)
                    .ok_or(EventError::ProgressOutOfRange(data.progress))?;
                EventKind::Progress {
                    progress,
                    message: data.message,
                }
            }
            "error" => {
                let data: ErrorData = payload("error", wire.data)?;
                EventKind::Error { error: data.error }
            }
            "complete" => {
                let data: CompleteData = payload("complete", wire.data)?;
                EventKind::Complete { result: data.result }
            }
            other => return Err(EventError::UnknownType(other.to_string())),
        };

        Ok(StreamEvent {
            timestamp: wire.timestamp.unwrap_or_else(Utc::now),
            kind,
        })
    }
}

impl From<StreamEvent> for WireEvent {
    fn from(event: StreamEvent) -> Self {
        let event_type = event.event_type().to_string();
        let data = match event.kind {
            EventKind::Log { message } => serde_json::json!({ "message": message }),
            EventKind::Output { content } => serde_json::json!({ "content": content }),
            EventKind::Progress { progress, message } => match message {
                Some(message) => serde_json::json!({ "progress": progress, "message": message }),
                None => serde_json::json!({ "progress": progress }),
            },
            EventKind::Error { error } => serde_json::json!({ "error": error }),
            EventKind::Complete { result } => serde_json::json!({ "result": result }),
        };

        Self {
            event_type,
            timestamp: Some(event.timestamp),
            data,
        }
    }
}
