// src/producer/recorder.rs
//! Request-path recorder
//!
//! Producers never wait on the buffer: every record goes through
//! `try_enqueue`, and whatever the queue answers is logged and swallowed.
//! A full or closed buffer costs the caller a trace, never a request.

use crate::events::{CallTrace, ErrorTrace, RequestContext, TraceEvent};
use crate::queue::EventQueue;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cheap-to-clone handle onto both trace queues
#[derive(Clone)]
pub struct TraceRecorder {
    service_name: Arc<str>,
    calls: Arc<EventQueue<CallTrace>>,
    errors: Arc<EventQueue<ErrorTrace>>,
}

impl TraceRecorder {
    pub fn new(
        service_name: impl Into<String>,
        calls: Arc<EventQueue<CallTrace>>,
        errors: Arc<EventQueue<ErrorTrace>>,
    ) -> Self {
        Self {
            service_name: Arc::from(service_name.into()),
            calls,
            errors,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Buffer a call trace. Returns whether the queue accepted it.
    pub fn record_call(&self, trace: CallTrace) -> bool {
        offer(&self.calls, trace)
    }

    /// Buffer an error trace. Returns whether the queue accepted it.
    pub fn record_error(&self, trace: ErrorTrace) -> bool {
        offer(&self.errors, trace)
    }

    /// Start timing an outbound call
    pub fn begin_call(
        &self,
        ctx: &RequestContext,
        operation: impl Into<String>,
        request_url: impl Into<String>,
    ) -> CallScope {
        CallScope {
            recorder: self.clone(),
            ctx: ctx.clone(),
            operation: operation.into(),
            request_url: request_url.into(),
            request_headers: None,
            request_payload: None,
            requested_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("service_name", &self.service_name)
            .field("calls", &self.calls.approx_size())
            .field("errors", &self.errors.approx_size())
            .finish()
    }
}

fn offer<T: TraceEvent>(queue: &EventQueue<T>, event: T) -> bool {
    let trace_id = event.trace_id().to_owned();
    match queue.try_enqueue(event) {
        Ok(true) => true,
        Ok(false) => {
            debug!(kind = T::KIND, trace_id = %trace_id, "Trace not buffered");
            false
        }
        Err(e) => {
            warn!(kind = T::KIND, trace_id = %trace_id, error = %e, "Failed to buffer trace");
            false
        }
    }
}

/// One in-flight outbound call
///
/// Captures the request timestamp at [`TraceRecorder::begin_call`]; consumed
/// by either [`CallScope::finish`] or [`CallScope::fail`].
#[derive(Debug)]
pub struct CallScope {
    recorder: TraceRecorder,
    ctx: RequestContext,
    operation: String,
    request_url: String,
    request_headers: Option<String>,
    request_payload: Option<String>,
    requested_at: DateTime<Utc>,
}

impl CallScope {
    /// Attach the request snapshot
    pub fn with_request(mut self, headers: Option<String>, payload: Option<String>) -> Self {
        self.request_headers = headers;
        self.request_payload = payload;
        self
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// The call produced a response: record a call trace
    pub fn finish(self, status: u16, response_payload: Option<String>) -> bool {
        let trace = CallTrace::new(
            &self.ctx,
            self.recorder.service_name(),
            self.operation,
            self.request_url,
        )
        .with_request(self.request_headers, self.request_payload)
        .requested_at(self.requested_at)
        .with_response(status, response_payload);

        self.recorder.record_call(trace)
    }

    /// The call failed without a response: record an error trace
    pub fn fail(self, message: impl Into<String>, detail: impl Into<String>) -> bool {
        let trace = ErrorTrace::new(&self.ctx, self.request_url, message, detail)
            .with_request(self.request_headers, self.request_payload);

        self.recorder.record_error(trace)
    }
}
