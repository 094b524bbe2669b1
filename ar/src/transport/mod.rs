//! Run transports
//!
//! A transport submits a job and then streams the run's events back through
//! an [`EventSink`]. Two implementations share the contract:
//!
//! - [`HttpTransport`]: `POST {base}/runs`, then an SSE channel at
//!   `{base}/runs/{run_id}/stream`
//! - [`SyntheticTransport`]: an in-process generator used when no backend is
//!   configured
//!
//! Both deliver events in generation order, deliver at most one terminal item
//! (a `complete`/`error` event or a channel failure) and go quiet once the
//! subscription is cancelled.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

mod error;
mod http;
mod sink;
mod synthetic;

pub use error::TransportError;
pub use http::HttpTransport;
pub use sink::{CancelHandle, Cancellation, Delivery, EventSink};
pub use synthetic::{SyntheticTransport, synthetic_script};

use crate::config::Config;
use crate::domain::{RunRequest, RunStatus, UploadedFile};

/// Result of a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTicket {
    pub run_id: String,
    /// Status reported by the backend at submission
    pub status: RunStatus,
}

/// Submit-and-stream capability
#[async_trait]
pub trait RunTransport: Send + Sync {
    /// Submit a run and start streaming its events into `sink`
    ///
    /// Returns once the run exists; events arrive asynchronously. An error
    /// here means no run was created and nothing will be delivered.
    async fn submit(&self, request: &RunRequest, sink: EventSink) -> Result<RunTicket, TransportError>;

    /// Upload an input file for later reference in `RunInputs::files`
    async fn upload(&self, path: &Path) -> Result<UploadedFile, TransportError>;

    /// Short name for logs and output
    fn name(&self) -> &'static str;
}

/// Create a transport based on the configuration
///
/// A resolved base URL selects the network transport; otherwise runs are
/// simulated in-process.
pub fn create_transport(config: &Config) -> Result<Arc<dyn RunTransport>, TransportError> {
    match config.api.resolved_base_url() {
        Some(base_url) => {
            debug!(%base_url, "create_transport: creating HTTP transport");
            Ok(Arc::new(HttpTransport::from_config(&config.api, base_url)?))
        }
        None => {
            debug!("create_transport: no base URL, creating synthetic transport");
            Ok(Arc::new(SyntheticTransport::from_config(&config.synthetic)))
        }
    }
}

/// Best-effort MIME type from a file extension
pub(crate) fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "md" | "markdown" => "text/markdown",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "yml" | "yaml" => "application/yaml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

pub(crate) fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
