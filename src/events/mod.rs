// src/events/mod.rs
//! Trace event records
//!
//! Two record shapes flow through the buffering engine:
//!
//! - **CallTrace**: one completed outbound call (request + response snapshot)
//! - **ErrorTrace**: one failure observed while serving a request
//!
//! Both implement [`TraceEvent`], which is all the queue and the drain
//! worker need to know about a payload.

pub mod call_trace;
pub mod error_trace;

pub use call_trace::CallTrace;
pub use error_trace::ErrorTrace;

use crate::utils::errors::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};

/// A payload the event queue can buffer
pub trait TraceEvent: Send + 'static {
    /// Short label used in logs and metrics (`"call"`, `"error"`)
    const KIND: &'static str;

    /// Correlation id of the request this event belongs to
    fn trace_id(&self) -> &str;

    /// Check required identifying fields before the event is enqueued
    fn validate(&self) -> QueueResult<()>;
}

/// Identifiers propagated from the inbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Correlation id (message identifier header)
    pub trace_id: String,

    /// Calling channel
    pub channel_id: String,

    /// Calling device
    pub device_id: String,

    /// Free-form lookup key (user, document number, device...)
    pub keyword: Option<String>,
}

impl RequestContext {
    pub fn new(
        trace_id: impl Into<String>,
        channel_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            channel_id: channel_id.into(),
            device_id: device_id.into(),
            keyword: None,
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }
}

/// Fail with `InvalidArgument` if `value` is blank
pub(crate) fn require(kind: &str, field: &str, value: &str) -> QueueResult<()> {
    if value.trim().is_empty() {
        return Err(QueueError::InvalidArgument(format!(
            "{} trace is missing {}",
            kind, field
        )));
    }
    Ok(())
}

/// New ULID identity for a record
pub(crate) fn new_identity() -> String {
    ulid::Ulid::new().to_string()
}
