// src/worker/sink.rs
//! Event sinks: where a drain worker hands each event
//!
//! Persistence is not part of this crate. A sink only accepts an event and
//! reports success or failure; retries are the sink's own business.

use crate::events::TraceEvent;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, Level};

/// Processing step for drained events
#[async_trait]
pub trait EventSink<T: Send + 'static>: Send + Sync {
    /// Handle one event
    async fn process(&self, event: T) -> Result<()>;
}

/// Logs every event through `tracing`
///
/// Trace id at info level, full JSON snapshot at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl<T> EventSink<T> for LogSink
where
    T: TraceEvent + Serialize,
{
    async fn process(&self, event: T) -> Result<()> {
        info!(kind = T::KIND, trace_id = event.trace_id(), "Processing event");

        if tracing::enabled!(Level::DEBUG) {
            let payload = serde_json::to_string(&event).map_err(|e| {
                EngineError::ProcessingFailed(format!("Serialization error: {}", e))
            })?;
            debug!(kind = T::KIND, payload = %payload, "Event payload");
        }

        Ok(())
    }
}

/// Keeps processed events in memory, in processing order
#[derive(Debug)]
pub struct MemorySink<T> {
    events: Mutex<Vec<T>>,
}

impl<T> Default for MemorySink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemorySink<T> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Remove and return everything collected so far
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[async_trait]
impl<T: Send + 'static> EventSink<T> for MemorySink<T> {
    async fn process(&self, event: T) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CallTrace, RequestContext};

    fn call(trace_id: &str) -> CallTrace {
        let ctx = RequestContext::new(trace_id, "web", "device-1");
        CallTrace::new(&ctx, "accounts-api", "Balance.Get", "http://core/balance")
    }

    #[tokio::test]
    async fn test_log_sink_accepts_events() {
        let sink = LogSink;
        assert!(sink.process(call("t-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.process(call("t-1")).await.unwrap();
        sink.process(call("t-2")).await.unwrap();

        assert_eq!(sink.len(), 2);
        let events = sink.take();
        assert_eq!(events[0].trace_id, "t-1");
        assert_eq!(events[1].trace_id, "t-2");
        assert!(sink.is_empty());
    }
}
