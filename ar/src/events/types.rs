//! Stream event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wire::WireEvent;
use crate::domain::RunResult;

/// What happened, with the payload that kind of event carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Diagnostic line from the run
    Log { message: String },
    /// Incremental chunk of the run's narrative output
    Output { content: String },
    /// Completion percentage, 0-100
    Progress { progress: u8, message: Option<String> },
    /// Application-level failure; terminal
    Error { error: String },
    /// Successful finish; terminal
    Complete { result: RunResult },
}

/// One unit of information pushed during a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub struct StreamEvent {
    /// Generation time at the producer
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl StreamEvent {
    /// Create an event stamped with the current time
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::new(EventKind::Log {
            message: message.into(),
        })
    }

    pub fn output(content: impl Into<String>) -> Self {
        Self::new(EventKind::Output {
            content: content.into(),
        })
    }

    pub fn progress(progress: u8, message: Option<String>) -> Self {
        Self::new(EventKind::Progress { progress, message })
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::new(EventKind::Error { error: error.into() })
    }

    pub fn complete(result: RunResult) -> Self {
        Self::new(EventKind::Complete { result })
    }

    /// `complete` and `error` end the run
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Complete { .. } | EventKind::Error { .. })
    }

    /// Wire discriminant
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::Log { .. } => "log",
            EventKind::Output { .. } => "output",
            EventKind::Progress { .. } => "progress",
            EventKind::Error { .. } => "error",
            EventKind::Complete { .. } => "complete",
        }
    }
}
