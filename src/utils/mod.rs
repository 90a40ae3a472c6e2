// src/utils/mod.rs
//! Shared utilities: configuration and error types

pub mod config;
pub mod errors;

pub use config::EngineConfig;
pub use errors::{EngineError, QueueError, QueueResult, Result};
