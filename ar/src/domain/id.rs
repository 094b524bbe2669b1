//! Run and subscription identifiers
//!
//! Run IDs use the format: `run-{12-char-hex}`
//! Example: `run-0193f2a81c4e`

use std::fmt;

/// Generate a run ID for runs created client-side
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    // v7 leads with the timestamp, take the random tail so ids created in the
    // same millisecond still differ
    format!("run-{}", &uuid[uuid.len() - 12..])
}

/// Identity of one live event subscription
///
/// Every submission gets a fresh id; deliveries carry it so that a stale
/// subscription can never mutate the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The id allocated after this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}
