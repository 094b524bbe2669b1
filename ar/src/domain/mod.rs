//! Domain types for agentrun
//!
//! Core domain types: Run, RunRequest, Artifact.
//! A Run is owned by the consumer for the lifetime of one submission.

mod artifact;
mod id;
mod run;

pub use artifact::{Artifact, RunResult, UploadedFile};
pub use id::{SubscriptionId, generate_run_id};
pub use run::{Run, RunInputs, RunRequest, RunStatus};
