// src/main.rs
//! Trace Buffer host process
//!
//! Runs the trace pipeline with log sinks until Ctrl-C, then drains the
//! queues and exits.

use anyhow::{Context, Result};
use tracing::{error, info};
use trace_buffer::observability::{init_metrics, init_tracing};
use trace_buffer::utils::config::EngineConfig;
use trace_buffer::{BuildInfo, TracePipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = EngineConfig::load().context("Failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(config.observability.metrics_socket_addr()?)?;

    let build = BuildInfo::current();
    info!(
        git_hash = build.git_hash,
        rustc = build.rustc_version,
        "Starting Trace Buffer v{}",
        build.version
    );
    info!("Configuration loaded: {:?}", config);

    let mut pipeline = TracePipeline::new(&config.queue);
    pipeline.start_with_log_sinks(&config.worker)?;

    let recorder = pipeline.recorder(config.service.name.as_str());
    info!(service = recorder.service_name(), "Trace pipeline ready");

    // Graceful shutdown handler
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
    }
    info!("Received shutdown signal, draining trace queues...");

    let report = pipeline.shutdown().await?;
    info!(
        calls_processed = report.call_worker.processed,
        errors_processed = report.error_worker.processed,
        calls_lost = report.stats.calls.evict_count + report.stats.calls.reject_count,
        errors_lost = report.stats.errors.evict_count + report.stats.errors.reject_count,
        "Shutdown complete"
    );

    Ok(())
}
