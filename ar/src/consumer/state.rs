//! Run state reducer
//!
//! `RunState` is the only place a `Run` is mutated. It owns the run and the
//! ordered log of every applied event. Once the run reaches a terminal state
//! every further event is ignored.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Run, RunRequest, RunStatus};
use crate::events::{EventKind, StreamEvent};

/// What applying one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Progress updated
    Progress(u8),
    /// Appended to the event log without touching the run
    Logged,
    /// Run finished successfully
    Completed,
    /// Run finished with an error event
    Failed,
    /// Run was already finished; event discarded
    Ignored,
}

impl Applied {
    pub fn is_terminal(self) -> bool {
        matches!(self, Applied::Completed | Applied::Failed)
    }
}

/// A run plus the events that shaped it
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    run: Run,
    events: Vec<StreamEvent>,
    /// Set when the event channel broke; independent of `run.status`
    connection_error: Option<String>,
}

impl RunState {
    /// State for a run the transport has just accepted
    pub fn new(run_id: impl Into<String>, request: RunRequest) -> Self {
        Self {
            run: Run::started(run_id, request),
            events: Vec::new(),
            connection_error: None,
        }
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    /// Every applied event, in arrival order
    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    pub fn connection_error(&self) -> Option<&str> {
        self.connection_error.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.run.is_finished()
    }

    /// Apply one event to the run
    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        debug!(run_id = %self.run.run_id, event_type = event.event_type(), "RunState::apply: called");
        if self.run.is_finished() {
            debug!(run_id = %self.run.run_id, status = %self.run.status, "RunState::apply: run finished, ignoring");
            return Applied::Ignored;
        }

        let applied = match &event.kind {
            EventKind::Progress { progress, .. } => {
                // Transport order is authoritative, a lower value still wins
                self.run.progress = *progress;
                Applied::Progress(*progress)
            }
            EventKind::Log { .. } | EventKind::Output { .. } => Applied::Logged,
            EventKind::Complete { result } => {
                self.run.status = RunStatus::Completed;
                self.run.finished_at = Some(Utc::now());
                self.run.result_summary = Some(result.summary.clone());
                self.run.artifacts = Some(result.artifacts.clone());
                info!(run_id = %self.run.run_id, artifacts = result.artifacts.len(), "RunState::apply: run completed");
                Applied::Completed
            }
            EventKind::Error { error } => {
                self.run.status = RunStatus::Failed;
                self.run.finished_at = Some(Utc::now());
                self.run.error = Some(error.clone());
                warn!(run_id = %self.run.run_id, %error, "RunState::apply: run failed");
                Applied::Failed
            }
        };

        self.events.push(event);
        applied
    }

    /// Explicitly end the run as cancelled; false if already finished
    pub fn mark_cancelled(&mut self) -> bool {
        debug!(run_id = %self.run.run_id, "RunState::mark_cancelled: called");
        if self.run.is_finished() {
            return false;
        }
        self.run.status = RunStatus::Cancelled;
        self.run.finished_at = Some(Utc::now());
        true
    }

    /// Record that the event channel failed; the run status is left as is
    pub fn record_connection_failure(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(run_id = %self.run.run_id, %message, "RunState::record_connection_failure: called");
        self.connection_error = Some(message);
    }
}
