//! agentrun - client-side consumer for agent run event streams
//!
//! Submits a job to an agent-execution backend, subscribes to the run's
//! ordered stream of events and folds them into a single [`Run`] record.
//! Without a configured backend, a synthetic transport plays a scripted run
//! in-process.
//!
//! # Modules
//!
//! - [`domain`] - runs, requests, artifacts and ids
//! - [`events`] - stream event types and wire decoding
//! - [`transport`] - the submit-and-stream contract, HTTP/SSE and synthetic
//! - [`consumer`] - the run state reducer and the subscription controller
//! - [`history`] - JSONL persistence of received events
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod consumer;
pub mod domain;
pub mod events;
pub mod history;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use consumer::{Applied, RunController, RunError, RunState, Update};
pub use domain::{Artifact, Run, RunInputs, RunRequest, RunResult, RunStatus, UploadedFile};
pub use events::{EventError, EventKind, StreamEvent};
pub use history::{EventLogEntry, HistoryError, RunHistory};
pub use transport::{
    EventSink, HttpTransport, RunTicket, RunTransport, SyntheticTransport, TransportError, create_transport,
};
