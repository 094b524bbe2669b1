//! Run history - persists received events to JSONL files
//!
//! Events are written to `{runs_dir}/{run-id}/events.jsonl` as they are
//! applied, and the final run to `{runs_dir}/{run-id}/run.json`, for replay
//! and debugging after the process exits.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HistoryConfig;
use crate::domain::Run;
use crate::events::StreamEvent;

const EVENTS_FILE: &str = "events.jsonl";
const SNAPSHOT_FILE: &str = "run.json";

/// Errors from reading or writing run history
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("History serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid run id: {0}")]
    InvalidRunId(String),
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Time the event was recorded
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: StreamEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: StreamEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Writes and reads per-run history directories
pub struct RunHistory {
    /// Base directory holding one subdirectory per run
    runs_dir: PathBuf,
    /// Open file writers per run
    writers: HashMap<String, BufWriter<File>>,
}

impl RunHistory {
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        let runs_dir = runs_dir.as_ref().to_path_buf();
        debug!(?runs_dir, "RunHistory::new: called");
        Self {
            runs_dir,
            writers: HashMap::new(),
        }
    }

    /// History under the default data directory
    pub fn with_default_path() -> Self {
        Self::new(HistoryConfig::default().runs_dir)
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf, HistoryError> {
        run_path(&self.runs_dir, run_id)
    }

    /// Append an event to its run's log file
    pub fn record(&mut self, run_id: &str, event: &StreamEvent) -> Result<(), HistoryError> {
        debug!(%run_id, event_type = event.event_type(), "RunHistory::record: called");

        let writer = match self.writers.entry(run_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(open_log(&self.runs_dir, run_id)?),
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Write the final state of a run and close its log
    pub fn write_snapshot(&mut self, run: &Run) -> Result<(), HistoryError> {
        debug!(run_id = %run.run_id, status = %run.status, "RunHistory::write_snapshot: called");
        let run_dir = self.run_dir(&run.run_id)?;
        fs::create_dir_all(&run_dir)?;
        fs::write(run_dir.join(SNAPSHOT_FILE), serde_json::to_string_pretty(run)?)?;
        self.close_run(&run.run_id);
        Ok(())
    }

    /// Close the writer for a run
    pub fn close_run(&mut self, run_id: &str) {
        debug!(%run_id, "RunHistory::close_run: called");
        if let Some(mut writer) = self.writers.remove(run_id) {
            let _ = writer.flush();
        }
    }

    /// Read back a run's events; a run without history yields nothing
    pub fn read_events(&self, run_id: &str) -> Result<Vec<EventLogEntry>, HistoryError> {
        let log_path = self.run_dir(run_id)?.join(EVENTS_FILE);
        debug!(?log_path, "RunHistory::read_events: reading log file");

        if !log_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&log_path)?;
        let mut entries = Vec::new();

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(line, error = %e, "RunHistory::read_events: failed to parse line");
                }
            }
        }

        Ok(entries)
    }

    /// Read a run's final snapshot, if one was written
    pub fn read_snapshot(&self, run_id: &str) -> Result<Option<Run>, HistoryError> {
        let path = self.run_dir(run_id)?.join(SNAPSHOT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Run ids with a history directory, sorted
    pub fn list_runs(&self) -> Result<Vec<String>, HistoryError> {
        if !self.runs_dir.exists() {
            return Ok(Vec::new());
        }
        let mut runs: Vec<String> = fs::read_dir(&self.runs_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        runs.sort();
        Ok(runs)
    }
}

/// Directory for one run; run ids come from the backend and must not
/// escape the runs dir
fn run_path(runs_dir: &Path, run_id: &str) -> Result<PathBuf, HistoryError> {
    let valid = !run_id.is_empty()
        && run_id != "."
        && run_id != ".."
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(HistoryError::InvalidRunId(run_id.to_string()));
    }
    Ok(runs_dir.join(run_id))
}

/// Open a run's event log for appending, creating its directory
fn open_log(runs_dir: &Path, run_id: &str) -> Result<BufWriter<File>, HistoryError> {
    let run_dir = run_path(runs_dir, run_id)?;
    fs::create_dir_all(&run_dir)?;

    let log_path = run_dir.join(EVENTS_FILE);
    debug!(?log_path, "open_log: opening log file");

    let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
    Ok(BufWriter::new(file))
}

impl Drop for RunHistory {
    fn drop(&mut self) {
        for (run_id, mut writer) in self.writers.drain() {
            debug!(%run_id, "RunHistory: flushing writer on drop");
            let _ = writer.flush();
        }
    }
}
