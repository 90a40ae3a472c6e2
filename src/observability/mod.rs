// src/observability/mod.rs
//! Logging and metrics
//!
//! - **Tracing**: fmt subscriber with `EnvFilter`; `RUST_LOG` wins over the
//!   configured level
//! - **Metrics**: `metrics` facade, exported through a Prometheus listener
//!   when an address is configured
//!
//! # Metrics
//!
//! | name                           | type    | labels   |
//! |--------------------------------|---------|----------|
//! | `trace_queue_size`             | gauge   | `kind`   |
//! | `trace_queue_capacity`         | gauge   | `kind`   |
//! | `trace_queue_enqueued_total`   | counter | `kind`   |
//! | `trace_queue_dequeued_total`   | counter | `kind`   |
//! | `trace_queue_evicted_total`    | counter | `kind`   |
//! | `trace_queue_rejected_total`   | counter | `kind`   |
//! | `trace_worker_processed_total` | counter | `worker` |
//! | `trace_worker_failed_total`    | counter | `worker` |

use crate::queue::QueueStats;
use crate::utils::config::ObservabilityConfig;
use crate::utils::errors::{EngineError, Result};
use crate::worker::WorkerReport;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

static METRICS_LISTENER: OnceCell<Option<SocketAddr>> = OnceCell::new();

/// Install the global tracing subscriber
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            EngineError::ObservabilityFailed(format!(
                "Invalid log level '{}': {}",
                config.log_level, e
            ))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| {
        EngineError::ObservabilityFailed(format!("Failed to set tracing subscriber: {}", e))
    })
}

/// Install the Prometheus exporter
///
/// With no address, metrics calls stay no-ops. Must run inside a tokio
/// runtime. Only the first call installs anything; concurrent callers block
/// until it finishes and then see its outcome.
pub fn init_metrics(listen_addr: Option<SocketAddr>) -> Result<()> {
    let mut installed_here = false;
    let existing = METRICS_LISTENER.get_or_try_init(|| {
        installed_here = true;
        install_exporter(listen_addr)
    })?;

    if !installed_here {
        debug!(listener = ?existing, "Metrics already initialized");
    }
    Ok(())
}

fn install_exporter(listen_addr: Option<SocketAddr>) -> Result<Option<SocketAddr>> {
    match listen_addr {
        Some(addr) => {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| {
                    EngineError::ObservabilityFailed(format!(
                        "Failed to install metrics exporter: {}",
                        e
                    ))
                })?;
            info!("Metrics exporter listening on {}", addr);
        }
        None => debug!("No metrics address configured, metrics exporter disabled"),
    }
    Ok(listen_addr)
}

/// Export a queue snapshot
pub fn publish_queue_stats(stats: &QueueStats) {
    let kind = stats.kind;

    gauge!("trace_queue_size", "kind" => kind).set(stats.current_size as f64);
    gauge!("trace_queue_capacity", "kind" => kind).set(stats.capacity as f64);
    counter!("trace_queue_enqueued_total", "kind" => kind).absolute(stats.enqueue_count);
    counter!("trace_queue_dequeued_total", "kind" => kind).absolute(stats.dequeue_count);
    counter!("trace_queue_evicted_total", "kind" => kind).absolute(stats.evict_count);
    counter!("trace_queue_rejected_total", "kind" => kind).absolute(stats.reject_count);
}

/// Export the final counters of a stopped worker
pub fn publish_worker_report(worker: &str, report: &WorkerReport) {
    let worker = worker.to_string();

    counter!("trace_worker_processed_total", "worker" => worker.clone()).absolute(report.processed);
    counter!("trace_worker_failed_total", "worker" => worker).absolute(report.failed);
}
