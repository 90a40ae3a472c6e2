// src/utils/errors.rs
//! Error types
//!
//! `QueueError` is the closed set of failures the event queue surfaces to
//! its callers. `EngineError` covers everything around it (workers, sinks,
//! configuration, the traced HTTP client).

use thiserror::Error;

/// Failures surfaced by `EventQueue` operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Item failed validation, or a constructor argument was out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Queue was completed and holds no more items
    #[error("queue closed")]
    Closed,

    /// Queue was disposed
    #[error("queue disposed")]
    Disposed,

    /// Cancellation token fired or deadline expired while suspended
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Engine-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Event processing failed: {0}")]
    ProcessingFailed(String),

    #[error("HTTP request failed: {0}")]
    HttpRequestFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    #[error("Observability setup failed: {0}")]
    ObservabilityFailed(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
