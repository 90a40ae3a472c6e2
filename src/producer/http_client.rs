// src/producer/http_client.rs
//! Traced outbound HTTP client
//!
//! Wraps a hyper-util client. Every call is snapshotted (headers, body
//! truncated to a configurable size) and buffered as a call trace when a
//! response arrives, or as an error trace when the transport fails.
//! Recording never fails the call itself.

use crate::events::error_trace::render_causes;
use crate::events::RequestContext;
use crate::producer::recorder::TraceRecorder;
use crate::utils::config::HttpConfig;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{HeaderMap, Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

/// HTTP client that records a trace for every call
pub struct TracedHttpClient {
    recorder: TraceRecorder,
    max_snapshot_bytes: usize,
    http_client: Client<HttpConnector, Full<Bytes>>,
}

impl TracedHttpClient {
    pub fn new(recorder: TraceRecorder, config: &HttpConfig) -> Self {
        let http_client = Client::builder(TokioExecutor::new()).build_http();

        Self {
            recorder,
            max_snapshot_bytes: config.max_snapshot_bytes,
            http_client,
        }
    }

    /// Perform `request` and record its outcome under `operation`
    ///
    /// Any HTTP response, including 4xx/5xx, is returned as `Ok`. Transport
    /// failures return `HttpRequestFailed`. No retries.
    pub async fn send(
        &self,
        ctx: &RequestContext,
        operation: &str,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Bytes>> {
        let url = request.uri().to_string();
        let (parts, body) = request.into_parts();

        let body_bytes = body
            .collect()
            .await
            .map_err(|e| EngineError::HttpRequestFailed(format!("Request body error: {}", e)))?
            .to_bytes();

        let scope = self
            .recorder
            .begin_call(ctx, operation, url.as_str())
            .with_request(snapshot_headers(&parts.headers), self.snapshot_body(&body_bytes));

        debug!(trace_id = %ctx.trace_id, method = %parts.method, url = %url, "Sending request");

        let request = Request::from_parts(parts, Full::new(body_bytes));
        let response = match self.http_client.request(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, url = %url, error = %e, "Request failed");
                scope.fail(e.to_string(), render_causes(&e));
                return Err(EngineError::HttpRequestFailed(format!("{} {}: {}", operation, url, e)));
            }
        };

        let (parts, body) = response.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, url = %url, error = %e, "Response body failed");
                scope.fail(e.to_string(), render_causes(&e));
                return Err(EngineError::HttpRequestFailed(format!(
                    "Response body error: {}",
                    e
                )));
            }
        };

        debug!(trace_id = %ctx.trace_id, status = %parts.status, "Received response");
        scope.finish(parts.status.as_u16(), self.snapshot_body(&body_bytes));

        Ok(Response::from_parts(parts, body_bytes))
    }

    fn snapshot_body(&self, body: &[u8]) -> Option<String> {
        if body.is_empty() {
            return None;
        }
        if body.len() <= self.max_snapshot_bytes {
            return Some(String::from_utf8_lossy(body).into_owned());
        }

        let mut snapshot = String::from_utf8_lossy(&body[..self.max_snapshot_bytes]).into_owned();
        snapshot.push_str(&format!("...[{} bytes truncated]", body.len() - self.max_snapshot_bytes));
        Some(snapshot)
    }
}

/// Headers as a JSON object; non-UTF-8 values are skipped
fn snapshot_headers(headers: &HeaderMap) -> Option<String> {
    if headers.is_empty() {
        return None;
    }

    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), serde_json::Value::from(v)))
        })
        .collect();

    serde_json::to_string(&map).ok()
}
