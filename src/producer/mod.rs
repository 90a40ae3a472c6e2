// src/producer/mod.rs
//! Producer side: recording traces from the request path
//!
//! - **TraceRecorder**: non-blocking `record_call` / `record_error`
//! - **CallScope**: times one outbound call, then finishes or fails it
//! - **TracedHttpClient**: hyper client that records every call it makes

pub mod http_client;
pub mod recorder;

pub use http_client::TracedHttpClient;
pub use recorder::{CallScope, TraceRecorder};
