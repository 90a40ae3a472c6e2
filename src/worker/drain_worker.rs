// src/worker/drain_worker.rs
//! Long-lived consumer task for one event queue
//!
//! The worker iterates the queue's `drain()` stream and hands each event to
//! its sink. A failing or panicking sink costs one event, never the loop.
//!
//! # States
//!
//! ```text
//! Idle → Consuming ⇄ Processing → Draining → Stopped
//! ```
//!
//! `Draining` means completion was requested and the remaining buffered
//! events are being worked off. Once entered it holds, through the
//! processing of each remaining event, until `Stopped`. A worker idle on an
//! empty queue when completion arrives has nothing to work off and goes
//! straight from `Consuming` to `Stopped`. `Stopped` is terminal: the queue
//! is completed and empty, disposed, or the worker was cancelled.

use crate::events::TraceEvent;
use crate::queue::EventQueue;
use crate::utils::errors::{EngineError, QueueError, Result};
use crate::worker::sink::EventSink;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

/// Lifecycle state of a drain worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Consuming,
    Processing,
    Draining,
    Stopped,
}

/// Counters returned when a worker stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Events the sink accepted
    pub processed: u64,

    /// Events the sink failed on, panicked on, or that were abandoned at cancellation
    pub failed: u64,
}

/// Consumer loop bound to one queue and one sink
pub struct DrainWorker<T: TraceEvent> {
    name: String,
    queue: Arc<EventQueue<T>>,
    sink: Arc<dyn EventSink<T>>,
    state: watch::Sender<WorkerState>,
}

impl<T: TraceEvent> DrainWorker<T> {
    pub fn new(queue: Arc<EventQueue<T>>, sink: Arc<dyn EventSink<T>>) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);

        Self {
            name: format!("{}-drain-worker", T::KIND),
            queue,
            sink,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Run the worker on the tokio runtime
    pub fn spawn(self, cancel: CancellationToken) -> WorkerHandle {
        let name = self.name.clone();
        let state = self.subscribe();
        let task_cancel = cancel.clone();

        let join = tokio::spawn(async move { self.run(&task_cancel).await });

        WorkerHandle {
            name,
            join,
            state,
            cancel,
        }
    }

    /// Consume until the queue is completed and empty, disposed, or `cancel` fires
    pub async fn run(&self, cancel: &CancellationToken) -> WorkerReport {
        info!(worker = %self.name, "Drain worker started");

        let mut report = WorkerReport::default();
        self.set_state(WorkerState::Consuming);

        let events = self.queue.drain(cancel);
        tokio::pin!(events);

        while let Some(next) = events.next().await {
            let event = match next {
                Ok(event) => event,
                Err(QueueError::Cancelled) => {
                    info!(worker = %self.name, "Drain worker cancelled");
                    break;
                }
                Err(err) => {
                    warn!(worker = %self.name, error = %err, "Queue no longer readable, stopping");
                    break;
                }
            };

            self.set_state(self.busy_state(WorkerState::Processing));

            tokio::select! {
                biased;
                ok = self.process(event) => {
                    if ok {
                        report.processed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                _ = cancel.cancelled() => {
                    warn!(worker = %self.name, "Cancelled while processing, event abandoned");
                    report.failed += 1;
                    break;
                }
            }

            self.set_state(self.busy_state(WorkerState::Consuming));
        }

        self.set_state(WorkerState::Stopped);
        info!(
            worker = %self.name,
            processed = report.processed,
            failed = report.failed,
            "Drain worker stopped"
        );

        report
    }

    async fn process(&self, event: T) -> bool {
        let trace_id = event.trace_id().to_string();

        match AssertUnwindSafe(self.sink.process(event)).catch_unwind().await {
            Ok(Ok(())) => {
                trace!(worker = %self.name, trace_id = %trace_id, "Event processed");
                true
            }
            Ok(Err(err)) => {
                error!(
                    worker = %self.name,
                    trace_id = %trace_id,
                    error = %err,
                    "Event processing failed"
                );
                false
            }
            Err(panic) => {
                error!(
                    worker = %self.name,
                    trace_id = %trace_id,
                    panic = %panic_message(panic.as_ref()),
                    "Event sink panicked"
                );
                false
            }
        }
    }

    /// `Draining` once the queue is closed, `open` otherwise
    fn busy_state(&self, open: WorkerState) -> WorkerState {
        if self.queue.is_closed() {
            WorkerState::Draining
        } else {
            open
        }
    }

    fn set_state(&self, next: WorkerState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle to a spawned drain worker
pub struct WorkerHandle {
    name: String,
    join: JoinHandle<WorkerReport>,
    state: watch::Receiver<WorkerState>,
    cancel: CancellationToken,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request the worker to stop at its next suspension point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the worker reports `target`
    pub async fn wait_for_state(&mut self, target: WorkerState) -> Result<()> {
        self.state
            .wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| {
                EngineError::WorkerFailed(format!("{} exited before reaching {:?}", self.name, target))
            })
    }

    /// Wait for the worker to finish on its own
    pub async fn join(self) -> Result<WorkerReport> {
        let name = self.name;
        self.join
            .await
            .map_err(|e| EngineError::WorkerFailed(format!("{}: {}", name, e)))
    }

    /// Wait up to `grace` for the worker to finish, then cancel it
    pub async fn stop(self, grace: Duration) -> Result<WorkerReport> {
        let WorkerHandle {
            name,
            mut join,
            cancel,
            ..
        } = self;

        let outcome = match tokio::time::timeout(grace, &mut join).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(worker = %name, ?grace, "Drain worker still running after grace period, cancelling");
                cancel.cancel();
                join.await
            }
        };

        outcome.map_err(|e| EngineError::WorkerFailed(format!("{}: {}", name, e)))
    }
}
