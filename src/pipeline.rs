// src/pipeline.rs
//! Trace pipeline: both queues, their drain workers and the stats reporter
//!
//! # Architecture
//!
//! ```text
//! TraceRecorder ──┬──> EventQueue<CallTrace>  ──> DrainWorker ──> call sink
//!                 └──> EventQueue<ErrorTrace> ──> DrainWorker ──> error sink
//!                                 │
//!                          stats reporter ──> metrics
//! ```
//!
//! Shutdown order: complete both queues, let the workers drain for the
//! grace period, cancel whatever is still running, then dispose the queues.

use crate::events::{CallTrace, ErrorTrace};
use crate::observability::{publish_queue_stats, publish_worker_report};
use crate::producer::TraceRecorder;
use crate::queue::{EventQueue, QueueStats, DEFAULT_CAPACITY};
use crate::utils::config::{QueueConfig, WorkerConfig};
use crate::utils::errors::{EngineError, Result};
use crate::worker::{DrainWorker, EventSink, LogSink, WorkerHandle, WorkerReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshot of both queues
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub calls: QueueStats,
    pub errors: QueueStats,
}

/// Final counters returned by [`TracePipeline::shutdown`]
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub call_worker: WorkerReport,
    pub error_worker: WorkerReport,

    /// Queue counters taken after the workers stopped, before disposal
    pub stats: PipelineStats,
}

struct RunningWorkers {
    calls: WorkerHandle,
    errors: WorkerHandle,
    reporter: Option<JoinHandle<()>>,
    shutdown_grace: Duration,
}

/// Owns the trace queues and their background workers
pub struct TracePipeline {
    calls: Arc<EventQueue<CallTrace>>,
    errors: Arc<EventQueue<ErrorTrace>>,
    cancel: CancellationToken,
    running: Option<RunningWorkers>,
}

impl TracePipeline {
    /// Build both queues at [`DEFAULT_CAPACITY`]; nothing runs until
    /// [`TracePipeline::start`]
    pub fn new(config: &QueueConfig) -> Self {
        info!(
            capacity = DEFAULT_CAPACITY,
            policy = %config.overflow_policy,
            "Initializing trace pipeline"
        );

        Self {
            calls: Arc::new(EventQueue::new(config.overflow_policy)),
            errors: Arc::new(EventQueue::new(config.overflow_policy)),
            cancel: CancellationToken::new(),
            running: None,
        }
    }

    /// Spawn both drain workers and, if configured, the stats reporter
    pub fn start(
        &mut self,
        call_sink: Arc<dyn EventSink<CallTrace>>,
        error_sink: Arc<dyn EventSink<ErrorTrace>>,
        config: &WorkerConfig,
    ) -> Result<()> {
        if self.running.is_some() {
            return Err(EngineError::WorkerFailed("Trace pipeline already started".to_string()));
        }
        if self.calls.is_closed() || self.errors.is_closed() {
            return Err(EngineError::WorkerFailed("Trace pipeline already shut down".to_string()));
        }

        info!("Starting drain workers");

        let calls = DrainWorker::new(Arc::clone(&self.calls), call_sink).spawn(self.cancel.child_token());
        let errors = DrainWorker::new(Arc::clone(&self.errors), error_sink).spawn(self.cancel.child_token());

        let reporter = config.stats_interval().map(|interval| {
            spawn_stats_reporter(
                Arc::clone(&self.calls),
                Arc::clone(&self.errors),
                interval,
                self.cancel.child_token(),
            )
        });

        self.running = Some(RunningWorkers {
            calls,
            errors,
            reporter,
            shutdown_grace: config.shutdown_grace(),
        });

        Ok(())
    }

    /// [`TracePipeline::start`] with [`LogSink`] for both kinds
    pub fn start_with_log_sinks(&mut self, config: &WorkerConfig) -> Result<()> {
        self.start(Arc::new(LogSink), Arc::new(LogSink), config)
    }

    /// Producer handle stamped with `service_name`
    pub fn recorder(&self, service_name: impl Into<String>) -> TraceRecorder {
        TraceRecorder::new(service_name, Arc::clone(&self.calls), Arc::clone(&self.errors))
    }

    pub fn call_queue(&self) -> &Arc<EventQueue<CallTrace>> {
        &self.calls
    }

    pub fn error_queue(&self) -> &Arc<EventQueue<ErrorTrace>> {
        &self.errors
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            calls: self.calls.stats(),
            errors: self.errors.stats(),
        }
    }

    /// Drain and stop everything
    ///
    /// Events recorded before this call are delivered unless the workers
    /// overrun the grace period. The queues are disposed on return.
    pub async fn shutdown(mut self) -> Result<PipelineReport> {
        info!("Shutting down trace pipeline");

        self.calls.complete();
        self.errors.complete();

        let mut names = ("call-drain-worker".to_string(), "error-drain-worker".to_string());
        let (call_worker, error_worker) = match self.running.take() {
            Some(running) => {
                names = (running.calls.name().to_string(), running.errors.name().to_string());
                let grace = running.shutdown_grace;
                let (calls, errors) =
                    tokio::join!(running.calls.stop(grace), running.errors.stop(grace));

                self.cancel.cancel();
                if let Some(reporter) = running.reporter {
                    join_reporter(reporter).await;
                }

                (calls, errors)
            }
            None => (Ok(WorkerReport::default()), Ok(WorkerReport::default())),
        };

        let stats = self.stats();
        publish_queue_stats(&stats.calls);
        publish_queue_stats(&stats.errors);

        self.calls.dispose();
        self.errors.dispose();

        let call_worker = call_worker?;
        let error_worker = error_worker?;
        publish_worker_report(&names.0, &call_worker);
        publish_worker_report(&names.1, &error_worker);

        info!(
            calls_processed = call_worker.processed,
            calls_failed = call_worker.failed,
            errors_processed = error_worker.processed,
            errors_failed = error_worker.failed,
            "Trace pipeline stopped"
        );

        Ok(PipelineReport {
            call_worker,
            error_worker,
            stats,
        })
    }
}

/// Await the reporter task; returns false if it panicked or was aborted
async fn join_reporter(reporter: JoinHandle<()>) -> bool {
    match reporter.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Stats reporter ended abnormally");
            false
        }
    }
}

fn spawn_stats_reporter(
    calls: Arc<EventQueue<CallTrace>>,
    errors: Arc<EventQueue<ErrorTrace>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    for stats in [calls.stats(), errors.stats()] {
                        debug!(
                            kind = stats.kind,
                            size = stats.current_size,
                            fill = %format!("{:.1}%", stats.fill_percentage()),
                            loss = %format!("{:.1}%", stats.loss_rate()),
                            "Queue stats"
                        );
                        publish_queue_stats(&stats);
                    }
                }
            }
        }

        debug!("Stats reporter stopped");
    })
}
