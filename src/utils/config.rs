// src/utils/config.rs
//! Engine configuration
//!
//! Values come from (lowest to highest priority):
//!
//! 1. Built-in defaults
//! 2. `config/trace-buffer.{toml,yaml,json}` (optional)
//! 3. `TRACE_BUFFER__<SECTION>__<KEY>` environment variables
//!
//! Example: `TRACE_BUFFER__QUEUE__OVERFLOW_POLICY=drop_oldest`

use crate::queue::OverflowPolicy;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default configuration file stem, resolved relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config/trace-buffer";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TRACE_BUFFER";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub service: ServiceConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub http: HttpConfig,
    pub observability: ObservabilityConfig,
}

/// Identity of the process emitting traces
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Microservice name stamped on every call trace
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "trace-buffer".to_string(),
        }
    }
}

/// Settings shared by both event queues
///
/// Capacity is not configurable: every queue holds at most
/// [`DEFAULT_CAPACITY`](crate::queue::DEFAULT_CAPACITY) events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Behaviour when a queue is full
    pub overflow_policy: OverflowPolicy,
}

/// Drain worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long shutdown waits for workers to drain before cancelling them
    pub shutdown_grace_ms: u64,

    /// Interval between queue stats reports (0 disables the reporter)
    pub stats_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 5_000,
            stats_interval_secs: 30,
        }
    }
}

impl WorkerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        if self.stats_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.stats_interval_secs))
        }
    }
}

/// Traced HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Maximum bytes of a request/response body kept in a trace snapshot
    pub max_snapshot_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_snapshot_bytes: 4_096, // 4KB
        }
    }
}

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub log_level: String,

    /// Emit logs as JSON lines
    pub json_logs: bool,

    /// Prometheus scrape listener, e.g. `0.0.0.0:9100`
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_addr: None,
        }
    }
}

impl ObservabilityConfig {
    pub fn metrics_socket_addr(&self) -> Result<Option<SocketAddr>> {
        self.metrics_addr
            .as_deref()
            .map(|addr| {
                addr.parse().map_err(|e| {
                    EngineError::ConfigError(format!("Invalid metrics address '{}': {}", addr, e))
                })
            })
            .transpose()
    }
}

impl EngineConfig {
    /// Load from the default file location and environment
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(env_source())
            .build()?;

        Self::finish(settings)
    }

    /// Load from an explicit file (format inferred from the extension) and environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .add_source(env_source())
            .build()?;

        Self::finish(settings)
    }

    fn finish(settings: Config) -> Result<Self> {
        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "service.name cannot be empty".to_string(),
            ));
        }

        self.observability.metrics_socket_addr()?;

        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
