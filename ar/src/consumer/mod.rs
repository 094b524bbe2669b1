//! Run stream consumer
//!
//! [`RunState`] is the reducer: the single entry point that mutates a run.
//! [`RunController`] owns the transport subscription and feeds the reducer,
//! guarding against stale subscriptions and stopping on cancellation.

mod controller;
mod state;

pub use controller::{DEFAULT_INBOX_CAPACITY, RunController, RunError, Update};
pub use state::{Applied, RunState};
