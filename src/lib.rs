// src/lib.rs
//! Trace Buffer Library
//!
//! Bounded in-process buffering of call and error traces. Request handlers
//! record traces without waiting; background drain workers hand them to a
//! sink off the request path.
//!
//! # Architecture
//!
//! The crate is structured into several modules:
//!
//! - **events**: `CallTrace`, `ErrorTrace` and the `TraceEvent` trait
//! - **queue**: bounded event queue with configurable overflow policy
//! - **worker**: drain workers and event sinks
//! - **producer**: request-path recorder and traced HTTP client
//! - **pipeline**: wiring of queues, workers and the stats reporter
//! - **observability**: tracing subscriber and metrics exporter
//! - **utils**: configuration and errors

// Public module exports
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod producer;
pub mod queue;
pub mod utils;
pub mod worker;

// Re-export commonly used types
pub use events::{CallTrace, ErrorTrace, RequestContext, TraceEvent};
pub use pipeline::{PipelineReport, PipelineStats, TracePipeline};
pub use producer::{CallScope, TraceRecorder, TracedHttpClient};
pub use queue::{EventQueue, OverflowPolicy, QueueStats};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, QueueError, QueueResult, Result};
pub use worker::{DrainWorker, EventSink, LogSink, WorkerHandle, WorkerReport, WorkerState};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Build information
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
