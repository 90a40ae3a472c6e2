// src/events/error_trace.rs
//! Error trace record: one failure observed while serving a request

use crate::events::{new_identity, require, RequestContext, TraceEvent};
use crate::utils::errors::QueueResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTrace {
    /// Record id (ULID)
    pub identity: Option<String>,

    pub trace_id: String,
    pub channel_id: String,
    pub device_id: String,

    pub request_url: String,
    pub request_headers: Option<String>,
    pub request_payload: Option<String>,

    pub error_message: String,

    /// Error chain or backtrace text
    pub error_stack_trace: String,

    pub occurred_at: DateTime<Utc>,

    /// Set by whoever triages the error, never by the buffering engine
    pub is_resolved: bool,
}

impl ErrorTrace {
    pub fn new(
        ctx: &RequestContext,
        request_url: impl Into<String>,
        error_message: impl Into<String>,
        error_stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            identity: Some(new_identity()),
            trace_id: ctx.trace_id.clone(),
            channel_id: ctx.channel_id.clone(),
            device_id: ctx.device_id.clone(),
            request_url: request_url.into(),
            request_headers: None,
            request_payload: None,
            error_message: error_message.into(),
            error_stack_trace: error_stack_trace.into(),
            occurred_at: Utc::now(),
            is_resolved: false,
        }
    }

    /// Build from any error, rendering its `source()` chain as the trace text
    pub fn from_error(
        ctx: &RequestContext,
        request_url: impl Into<String>,
        error: &(dyn std::error::Error + 'static),
    ) -> Self {
        Self::new(ctx, request_url, error.to_string(), render_causes(error))
    }

    pub fn with_request(mut self, headers: Option<String>, payload: Option<String>) -> Self {
        self.request_headers = headers;
        self.request_payload = payload;
        self
    }
}

/// One `caused by: ...` line per `source()` below `error`
pub fn render_causes(error: &(dyn std::error::Error + 'static)) -> String {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(format!("caused by: {}", cause));
        source = cause.source();
    }
    chain.join("\n")
}

impl TraceEvent for ErrorTrace {
    const KIND: &'static str = "error";

    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn validate(&self) -> QueueResult<()> {
        require(Self::KIND, "trace_id", &self.trace_id)?;
        require(Self::KIND, "channel_id", &self.channel_id)?;
        require(Self::KIND, "device_id", &self.device_id)?;
        require(Self::KIND, "request_url", &self.request_url)?;
        Ok(())
    }
}
