//! Run domain type
//!
//! Tracks the client-side state of one job submission, from submission to
//! terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::artifact::Artifact;

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Submitted, not yet running
    #[default]
    Pending,
    /// Actively streaming events
    Running,
    /// Finished with a result
    Completed,
    /// Finished with an error event
    Failed,
    /// Stopped by the user
    Cancelled,
}

impl RunStatus {
    /// Terminal states accept no further mutation
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" | "queued" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" | "complete" => Ok(Self::Completed),
            "failed" | "error" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// Inputs attached to a run submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInputs {
    /// Uploaded file ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Caller-supplied parameters of a run submission
///
/// Serializes to the job submission body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub agent_id: String,
    pub instructions: String,

    #[serde(default)]
    pub inputs: RunInputs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrations: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl RunRequest {
    /// Create a request with no inputs
    pub fn new(agent_id: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            instructions: instructions.into(),
            ..Default::default()
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.inputs.files = non_empty(files);
        self
    }

    pub fn with_links(mut self, links: Vec<String>) -> Self {
        self.inputs.links = non_empty(links);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.inputs.notes = Some(notes.into());
        self
    }

    pub fn with_integrations(mut self, integrations: Vec<String>) -> Self {
        self.integrations = non_empty(integrations);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() { None } else { Some(values) }
}

/// Client-side state of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Identifier assigned by the transport at submission
    pub run_id: String,

    pub status: RunStatus,

    /// Echo of the submitted parameters
    pub request: RunRequest,

    pub started_at: DateTime<Utc>,

    /// Unset until a terminal state is reached
    pub finished_at: Option<DateTime<Utc>>,

    /// Last reported progress, 0-100
    pub progress: u8,

    /// Set only by a `complete` event
    pub result_summary: Option<String>,

    /// Set only by a `complete` event
    pub artifacts: Option<Vec<Artifact>>,

    /// Set only by an `error` event
    pub error: Option<String>,
}

impl Run {
    /// Create a run that has just been accepted by the transport
    pub fn started(run_id: impl Into<String>, request: RunRequest) -> Self {
        let run_id = run_id.into();
        debug!(%run_id, agent_id = %request.agent_id, "Run::started: called");
        Self {
            run_id,
            status: RunStatus::Running,
            request,
            started_at: Utc::now(),
            finished_at: None,
            progress: 0,
            result_summary: None,
            artifacts: None,
            error: None,
        }
    }

    /// True once a terminal state has been recorded
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Wall-clock duration, if finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}
