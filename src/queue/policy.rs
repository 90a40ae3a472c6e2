// src/queue/policy.rs
//! Overflow policies for a full event queue

use serde::{Deserialize, Serialize};
use std::fmt;

/// What an enqueue does when the buffer is at capacity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the producer until space frees or the queue closes (no loss)
    #[default]
    Wait,

    /// Evict the oldest buffered event to make room
    DropOldest,

    /// Evict the most recently buffered event to make room
    DropNewest,

    /// Refuse the incoming event
    RejectNewest,
}

impl OverflowPolicy {
    /// Whether a full buffer can lose events under this policy
    pub fn is_lossy(&self) -> bool {
        !matches!(self, OverflowPolicy::Wait)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::Wait => "wait",
            OverflowPolicy::DropOldest => "drop_oldest",
            OverflowPolicy::DropNewest => "drop_newest",
            OverflowPolicy::RejectNewest => "reject_newest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
