//! Stream event model
//!
//! One `StreamEvent` is created by a transport for every message it receives
//! (or generates), consumed exactly once by the run consumer, then kept only
//! as a read-only entry of the run's event log.
//!
//! # Wire format
//!
//! ```text
//! {"type": "progress", "timestamp": "2026-01-01T00:00:00Z", "data": {"progress": 50}}
//! ```
//!
//! | type       | data                                        |
//! |------------|---------------------------------------------|
//! | `log`      | `{"message": ..}`                           |
//! | `output`   | `{"content": ..}`                           |
//! | `progress` | `{"progress": 0..=100, "message"?: ..}`     |
//! | `error`    | `{"error": ..}`                             |
//! | `complete` | `{"result": {"summary": .., "artifacts": []}}` |
//!
//! Decoding validates the payload against the type; see [`EventError`].

mod error;
mod types;
mod wire;

pub use error::EventError;
pub use types::{EventKind, StreamEvent};
