// src/events/call_trace.rs
//! Call trace record: one outbound call and its response

use crate::events::{new_identity, require, RequestContext, TraceEvent};
use crate::utils::errors::QueueResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one outbound call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTrace {
    /// Record id (ULID)
    pub identity: Option<String>,

    pub trace_id: String,
    pub channel_id: String,
    pub device_id: String,
    pub keyword: Option<String>,

    /// Microservice that made the call
    pub microservice_name: String,

    /// Logical operation, e.g. `Transfer.GetBalance.execute`
    pub operation_name: String,

    pub request_url: String,
    pub request_headers: Option<String>,
    pub request_payload: Option<String>,
    pub requested_at: DateTime<Utc>,

    pub response_status: u16,
    pub response_payload: Option<String>,
    pub responded_at: DateTime<Utc>,
}

impl CallTrace {
    /// Start a call trace; the response fields are filled by [`CallTrace::with_response`]
    pub fn new(
        ctx: &RequestContext,
        microservice_name: impl Into<String>,
        operation_name: impl Into<String>,
        request_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            identity: Some(new_identity()),
            trace_id: ctx.trace_id.clone(),
            channel_id: ctx.channel_id.clone(),
            device_id: ctx.device_id.clone(),
            keyword: ctx.keyword.clone(),
            microservice_name: microservice_name.into(),
            operation_name: operation_name.into(),
            request_url: request_url.into(),
            request_headers: None,
            request_payload: None,
            requested_at: now,
            response_status: 0,
            response_payload: None,
            responded_at: now,
        }
    }

    pub fn with_request(mut self, headers: Option<String>, payload: Option<String>) -> Self {
        self.request_headers = headers;
        self.request_payload = payload;
        self
    }

    pub fn requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = at;
        self
    }

    /// Stamp the response; `responded_at` is set to now
    pub fn with_response(mut self, status: u16, payload: Option<String>) -> Self {
        self.response_status = status;
        self.response_payload = payload;
        self.responded_at = Utc::now();
        self
    }

    /// Round-trip latency in milliseconds
    pub fn elapsed_ms(&self) -> i64 {
        (self.responded_at - self.requested_at).num_milliseconds()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.response_status)
    }
}

impl TraceEvent for CallTrace {
    const KIND: &'static str = "call";

    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn validate(&self) -> QueueResult<()> {
        require(Self::KIND, "trace_id", &self.trace_id)?;
        require(Self::KIND, "channel_id", &self.channel_id)?;
        require(Self::KIND, "device_id", &self.device_id)?;
        require(Self::KIND, "request_url", &self.request_url)?;
        require(Self::KIND, "microservice_name", &self.microservice_name)?;
        require(Self::KIND, "operation_name", &self.operation_name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::QueueError;

    fn ctx() -> RequestContext {
        RequestContext::new("trace-001", "mobile", "device-42")
    }

    #[test]
    fn test_new_call_trace() {
        let trace = CallTrace::new(&ctx(), "accounts-api", "Balance.Get", "http://core/balance")
            .with_response(200, Some("{}".to_string()));

        assert!(trace.identity.is_some());
        assert_eq!(trace.trace_id, "trace-001");
        assert!(trace.is_success());
        assert!(trace.elapsed_ms() >= 0);
        assert!(trace.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut trace = CallTrace::new(&ctx(), "accounts-api", "Balance.Get", "");
        assert!(matches!(
            trace.validate(),
            Err(QueueError::InvalidArgument(msg)) if msg.contains("request_url")
        ));

        trace.request_url = "http://core/balance".to_string();
        trace.device_id.clear();
        assert!(matches!(
            trace.validate(),
            Err(QueueError::InvalidArgument(msg)) if msg.contains("device_id")
        ));
    }

    #[test]
    fn test_serializes_camel_case() {
        let trace = CallTrace::new(&ctx(), "accounts-api", "Balance.Get", "http://core/balance");
        let json = serde_json::to_value(&trace).unwrap();

        assert_eq!(json["traceId"], "trace-001");
        assert_eq!(json["microserviceName"], "accounts-api");
        assert!(json.get("responseStatus").is_some());
    }
}
