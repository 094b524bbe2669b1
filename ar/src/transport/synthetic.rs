//! In-process synthetic transport
//!
//! Stands in for a backend when none is configured: every submission plays
//! the same scripted run (initialization logs, progress milestones, narrative
//! output, then a `complete` event with three artifacts), each event after a
//! random delay to approximate real latency.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};

use super::{EventSink, RunTicket, RunTransport, TransportError, content_type_for, millis};
use crate::config::SyntheticConfig;
use crate::domain::{Artifact, RunRequest, RunResult, RunStatus, UploadedFile, generate_run_id};
use crate::events::{EventKind, StreamEvent};

/// Synthetic transport with jittered delivery
#[derive(Debug, Clone)]
pub struct SyntheticTransport {
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for SyntheticTransport {
    fn default() -> Self {
        Self::from_config(&SyntheticConfig::default())
    }
}

impl SyntheticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with an explicit delay range; bounds are swapped if reversed
    pub fn with_delay(min_delay: Duration, max_delay: Duration) -> Self {
        debug!(?min_delay, ?max_delay, "SyntheticTransport::with_delay: called");
        if min_delay <= max_delay {
            Self { min_delay, max_delay }
        } else {
            Self {
                min_delay: max_delay,
                max_delay: min_delay,
            }
        }
    }

    pub fn from_config(config: &SyntheticConfig) -> Self {
        Self::with_delay(millis(config.min_delay_ms), millis(config.max_delay_ms))
    }

    pub fn delay_range(&self) -> (Duration, Duration) {
        (self.min_delay, self.max_delay)
    }
}

/// Uniform random delay in `[min, max]`
fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}

/// The fixed event sequence played for every synthetic run
pub fn synthetic_script(request: &RunRequest) -> Vec<EventKind> {
    let file_count = request.inputs.files.as_ref().map_or(0, Vec::len);
    let link_count = request.inputs.links.as_ref().map_or(0, Vec::len);
    let mode = request.mode.as_deref().unwrap_or("standard");

    let log = |message: String| EventKind::Log { message };
    let progress = |progress: u8, message: &str| EventKind::Progress {
        progress,
        message: Some(message.to_string()),
    };
    let output = |content: &str| EventKind::Output {
        content: content.to_string(),
    };

    let report = format!(
        "# Run report\n\nAgent: {}\nMode: {}\n\nInstructions: {}\n",
        request.agent_id, mode, request.instructions
    );
    let results = serde_json::json!({
        "agent_id": request.agent_id,
        "files": file_count,
        "links": link_count,
        "findings": 3,
    })
    .to_string();
    let run_log = "initialized\nanalyzed\ngenerated\n".to_string();

    let artifact = |id: &str, name: &str, kind: &str, content: String| Artifact {
        id: id.to_string(),
        name: name.to_string(),
        kind: kind.to_string(),
        size: content.len() as u64,
        url: None,
        content: Some(content),
    };

    vec![
        log(format!("Initializing agent {}", request.agent_id)),
        log(format!("Loaded {} file(s) and {} link(s)", file_count, link_count)),
        progress(10, "Inputs loaded"),
        log("Planning approach".to_string()),
        progress(25, "Plan ready"),
        output("Reviewing the instructions and the provided inputs.\n"),
        progress(50, "Analysis in progress"),
        output("Identified the key requirements and gathered supporting material.\n"),
        output("Drafting the results and cross-checking each finding.\n"),
        progress(75, "Drafting results"),
        log("Writing artifacts".to_string()),
        progress(90, "Finalizing"),
        output("All findings verified. Packaging the deliverables.\n"),
        progress(100, "Done"),
        EventKind::Complete {
            result: RunResult {
                summary: format!(
                    "Agent {} completed the task in {} mode and produced 3 artifacts.",
                    request.agent_id, mode
                ),
                artifacts: vec![
                    artifact("artifact-1", "report.md", "text/markdown", report),
                    artifact("artifact-2", "results.json", "application/json", results),
                    artifact("artifact-3", "run.log", "text/plain", run_log),
                ],
            },
        },
    ]
}

#[async_trait]
impl RunTransport for SyntheticTransport {
    async fn submit(&self, request: &RunRequest, sink: EventSink) -> Result<RunTicket, TransportError> {
        let run_id = generate_run_id();
        debug!(%run_id, subscription = %sink.subscription(), "submit: called");
        info!(%run_id, agent_id = %request.agent_id, "submit: synthetic run created");

        let script = synthetic_script(request);
        let (min_delay, max_delay) = (self.min_delay, self.max_delay);
        let task_run_id = run_id.clone();

        tokio::spawn(async move {
            let mut cancellation = sink.cancellation();
            for kind in script {
                let delay = jitter(min_delay, max_delay);
                tokio::select! {
                    _ = cancellation.cancelled() => {
                        debug!(run_id = %task_run_id, "synthetic: cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                if !sink.emit(StreamEvent::new(kind)).await {
                    debug!(run_id = %task_run_id, "synthetic: subscription closed");
                    return;
                }
            }
            debug!(run_id = %task_run_id, "synthetic: script finished");
        });

        Ok(RunTicket {
            run_id,
            status: RunStatus::Running,
        })
    }

    async fn upload(&self, path: &Path) -> Result<UploadedFile, TransportError> {
        debug!(?path, "upload: called");
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let uuid = uuid::Uuid::now_v7().simple().to_string();

        Ok(UploadedFile {
            file_id: format!("file-{}", &uuid[uuid.len() - 12..]),
            name,
            size: metadata.len(),
            content_type: content_type_for(path).to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}
