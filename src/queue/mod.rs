// src/queue/mod.rs
//! In-process event buffering
//!
//! - **Event Queue**: bounded MPMC queue, generic over the event payload
//! - **Overflow Policy**: wait, drop oldest, drop newest or reject newest
//!
//! # Architecture
//!
//! ```text
//! Producers ── try_enqueue() ──┐
//!   (request path, never wait) │
//!                              ▼
//!                   EventQueue<T> (capacity 500)
//!                              │
//!                     drain() stream
//!                              ▼
//!                     DrainWorker ──> EventSink
//! ```
//!
//! One queue exists per event kind (`EventQueue<CallTrace>`,
//! `EventQueue<ErrorTrace>`) for the lifetime of the process.

pub mod event_queue;
pub mod policy;

pub use event_queue::{EventQueue, QueueStats, DEFAULT_CAPACITY};
pub use policy::OverflowPolicy;
