// src/worker/mod.rs
//! Background consumption of event queues
//!
//! - **Drain Worker**: one long-lived task per queue, run until the queue is
//!   completed and empty or the host cancels it
//! - **Sinks**: pluggable processing step (`LogSink` by default)

pub mod drain_worker;
pub mod sink;

pub use drain_worker::{DrainWorker, WorkerHandle, WorkerReport, WorkerState};
pub use sink::{EventSink, LogSink, MemorySink};
