// src/queue/event_queue.rs
//! Bounded MPMC event queue
//!
//! A fixed-capacity hand-off point between any number of producer tasks and
//! any number of consumer tasks. Admission and removal each happen in a
//! single short critical section, so a cancelled or timed-out caller can
//! never leave an item half inserted or half removed. Waiting producers and
//! consumers suspend on [`Notify`] and never block their thread.
//!
//! The occupancy counter is read without taking the lock and is meant for
//! metrics only. Admission is decided by the buffer length under the lock.

use crate::events::TraceEvent;
use crate::queue::policy::OverflowPolicy;
use crate::utils::errors::{QueueError, QueueResult};
use crossbeam::utils::CachePadded;
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Capacity used when none is given (bounds worst-case memory per queue)
pub const DEFAULT_CAPACITY: usize = 500;

enum Admission<T> {
    Accepted,
    Full(T),
    Rejected,
    Closed,
    Disposed,
}

enum Removal<T> {
    Item(T),
    Empty,
    Drained,
    Disposed,
}

/// Bounded event queue generic over the payload
pub struct EventQueue<T> {
    /// Buffered events, oldest first
    buffer: Mutex<VecDeque<T>>,

    capacity: usize,

    policy: OverflowPolicy,

    /// Written only while holding `buffer`
    completed: AtomicBool,

    /// Written only while holding `buffer`
    disposed: AtomicBool,

    /// Signalled when an event is buffered or the queue closes
    items_available: Notify,

    /// Signalled when an event is removed or the queue closes
    space_available: Notify,

    /// Approximate occupancy, eventually consistent
    approx_len: CachePadded<AtomicI64>,

    enqueue_count: AtomicU64,

    dequeue_count: AtomicU64,

    /// Buffered events displaced by DropOldest/DropNewest
    evict_count: AtomicU64,

    /// Incoming events refused because the buffer was full
    reject_count: AtomicU64,
}

impl<T: TraceEvent> EventQueue<T> {
    /// Create a queue with [`DEFAULT_CAPACITY`]
    ///
    /// This is the only constructor the pipeline uses; capacity is a
    /// process-wide constant, not a setting.
    pub fn new(policy: OverflowPolicy) -> Self {
        Self::build(DEFAULT_CAPACITY, policy)
    }

    /// Create a queue with an explicit capacity
    ///
    /// For tests and benchmarks that need tiny buffers (capacity 1 or 2) to
    /// exercise overflow. Production wiring goes through [`EventQueue::new`].
    pub fn with_capacity(capacity: usize, policy: OverflowPolicy) -> QueueResult<Self> {
        if capacity == 0 {
            return Err(QueueError::InvalidArgument(
                "queue capacity must be greater than 0".to_string(),
            ));
        }
        Ok(Self::build(capacity, policy))
    }

    fn build(capacity: usize, policy: OverflowPolicy) -> Self {
        debug!(
            kind = T::KIND,
            capacity,
            policy = %policy,
            "Creating event queue"
        );

        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            completed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            items_available: Notify::new(),
            space_available: Notify::new(),
            approx_len: CachePadded::new(AtomicI64::new(0)),
            enqueue_count: AtomicU64::new(0),
            dequeue_count: AtomicU64::new(0),
            evict_count: AtomicU64::new(0),
            reject_count: AtomicU64::new(0),
        }
    }

    /// Enqueue, suspending while the buffer is full (Wait policy)
    ///
    /// Returns `Ok(false)` if the queue was completed before the event was
    /// accepted, or if RejectNewest refused it.
    pub async fn enqueue_blocking(&self, item: T, cancel: &CancellationToken) -> QueueResult<bool> {
        self.ensure_usable()?;
        item.validate()?;

        let mut pending = item;
        loop {
            // Register before trying so a removal between the attempt and
            // the await is not missed.
            let space = self.space_available.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            match self.admit(pending) {
                Admission::Accepted => return Ok(true),
                Admission::Rejected | Admission::Closed => return Ok(false),
                Admission::Disposed => return Err(QueueError::Disposed),
                Admission::Full(item) => pending = item,
            }

            trace!(kind = T::KIND, trace_id = pending.trace_id(), "Queue full, waiting for space");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                _ = space.as_mut() => {}
            }
        }
    }

    /// [`enqueue_blocking`](Self::enqueue_blocking) with a deadline
    pub async fn enqueue_within(&self, item: T, timeout: Duration) -> QueueResult<bool> {
        let never = CancellationToken::new();
        tokio::time::timeout(timeout, self.enqueue_blocking(item, &never))
            .await
            .unwrap_or(Err(QueueError::Cancelled))
    }

    /// Enqueue without suspending
    ///
    /// Returns `Ok(false)` if the buffer is full and the policy does not
    /// make room, or if the queue is completed.
    pub fn try_enqueue(&self, item: T) -> QueueResult<bool> {
        self.ensure_usable()?;
        item.validate()?;

        match self.admit(item) {
            Admission::Accepted => Ok(true),
            Admission::Full(item) => {
                self.reject_count.fetch_add(1, Ordering::Relaxed);
                trace!(kind = T::KIND, trace_id = item.trace_id(), "Queue full, event not accepted");
                Ok(false)
            }
            Admission::Rejected | Admission::Closed => Ok(false),
            Admission::Disposed => Err(QueueError::Disposed),
        }
    }

    /// Dequeue, suspending while the buffer is empty
    ///
    /// Fails with `Closed` once the queue is completed and drained.
    pub async fn dequeue_blocking(&self, cancel: &CancellationToken) -> QueueResult<T> {
        loop {
            if cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            let ready = self.items_available.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            match self.take() {
                Removal::Item(item) => return Ok(item),
                Removal::Drained => return Err(QueueError::Closed),
                Removal::Disposed => return Err(QueueError::Disposed),
                Removal::Empty => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                _ = ready.as_mut() => {}
            }
        }
    }

    /// [`dequeue_blocking`](Self::dequeue_blocking) with a deadline
    pub async fn dequeue_within(&self, timeout: Duration) -> QueueResult<T> {
        let never = CancellationToken::new();
        tokio::time::timeout(timeout, self.dequeue_blocking(&never))
            .await
            .unwrap_or(Err(QueueError::Cancelled))
    }

    /// Dequeue without suspending (`None` when empty)
    pub fn try_dequeue(&self) -> QueueResult<Option<T>> {
        match self.take() {
            Removal::Item(item) => Ok(Some(item)),
            Removal::Empty | Removal::Drained => Ok(None),
            Removal::Disposed => Err(QueueError::Disposed),
        }
    }

    /// Lazily yield events as they arrive
    ///
    /// Each call returns a new single-pass stream. It ends once the queue is
    /// completed and empty. Cancellation or disposal yields one final error
    /// before the stream ends.
    ///
    /// A cancelled drain reports `Cancelled`, not `Closed`. `Closed` already
    /// means "completed and nothing left", which a cancelled consumer cannot
    /// claim: events may still be buffered. Reporting `Cancelled` keeps the
    /// stream consistent with `dequeue_blocking` and lets the drain worker
    /// tell a host-requested stop from a finished queue.
    pub fn drain<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = QueueResult<T>> + Send + 'a {
        stream::unfold(false, move |finished| async move {
            if finished {
                return None;
            }
            match self.dequeue_blocking(cancel).await {
                Ok(item) => Some((Ok(item), false)),
                Err(QueueError::Closed) => None,
                Err(err) => Some((Err(err), true)),
            }
        })
    }

    /// Stop accepting events; buffered events stay consumable. Idempotent.
    pub fn complete(&self) {
        let first = {
            let _buffer = self.buffer.lock();
            !self.completed.swap(true, Ordering::AcqRel)
        };

        if first {
            info!(kind = T::KIND, remaining = self.approx_size(), "Event queue completed");
        }

        self.wake_all();
    }

    /// Complete the queue and make every further call fail with `Disposed`.
    /// Buffered events are discarded. Idempotent.
    pub fn dispose(&self) {
        let discarded = {
            let mut buffer = self.buffer.lock();
            if self.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            self.completed.store(true, Ordering::Release);
            self.approx_len.store(0, Ordering::Relaxed);
            std::mem::take(&mut *buffer)
        };

        self.wake_all();

        if discarded.is_empty() {
            info!(kind = T::KIND, "Event queue disposed");
        } else {
            warn!(
                kind = T::KIND,
                discarded = discarded.len(),
                "Event queue disposed with undelivered events"
            );
        }
    }

    /// Eventually-consistent number of buffered events
    pub fn approx_size(&self) -> usize {
        let len = self.approx_len.load(Ordering::Relaxed);
        len.clamp(0, self.capacity as i64) as usize
    }

    /// Completion requested and every buffered event consumed
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire) && self.buffer.lock().is_empty()
    }

    /// Completion requested (events may still be buffered)
    pub fn is_closed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn kind(&self) -> &'static str {
        T::KIND
    }

    /// Snapshot of the queue counters
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            kind: T::KIND,
            policy: self.policy,
            enqueue_count: self.enqueue_count.load(Ordering::Relaxed),
            dequeue_count: self.dequeue_count.load(Ordering::Relaxed),
            evict_count: self.evict_count.load(Ordering::Relaxed),
            reject_count: self.reject_count.load(Ordering::Relaxed),
            current_size: self.approx_size(),
            capacity: self.capacity,
        }
    }

    fn ensure_usable(&self) -> QueueResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(QueueError::Disposed)
        } else {
            Ok(())
        }
    }

    fn admit(&self, item: T) -> Admission<T> {
        let mut buffer = self.buffer.lock();

        if self.disposed.load(Ordering::Acquire) {
            return Admission::Disposed;
        }
        if self.completed.load(Ordering::Acquire) {
            return Admission::Closed;
        }

        if buffer.len() < self.capacity {
            buffer.push_back(item);
            self.approx_len.fetch_add(1, Ordering::Relaxed);
            drop(buffer);
            self.on_accepted();
            return Admission::Accepted;
        }

        let evicted = match self.policy {
            OverflowPolicy::Wait => return Admission::Full(item),
            OverflowPolicy::RejectNewest => {
                drop(buffer);
                self.reject_count.fetch_add(1, Ordering::Relaxed);
                debug!(kind = T::KIND, trace_id = item.trace_id(), "Queue full, rejected newest event");
                return Admission::Rejected;
            }
            OverflowPolicy::DropOldest => buffer.pop_front(),
            OverflowPolicy::DropNewest => buffer.pop_back(),
        };
        buffer.push_back(item);
        drop(buffer);

        if let Some(evicted) = evicted {
            self.evict_count.fetch_add(1, Ordering::Relaxed);
            debug!(
                kind = T::KIND,
                trace_id = evicted.trace_id(),
                policy = %self.policy,
                "Queue full, evicted buffered event"
            );
        }
        self.on_accepted();
        Admission::Accepted
    }

    fn on_accepted(&self) {
        self.enqueue_count.fetch_add(1, Ordering::Relaxed);
        self.items_available.notify_waiters();
    }

    fn take(&self) -> Removal<T> {
        let mut buffer = self.buffer.lock();

        if self.disposed.load(Ordering::Acquire) {
            return Removal::Disposed;
        }

        match buffer.pop_front() {
            Some(item) => {
                self.approx_len.fetch_sub(1, Ordering::Relaxed);
                drop(buffer);
                self.dequeue_count.fetch_add(1, Ordering::Relaxed);
                self.space_available.notify_waiters();
                Removal::Item(item)
            }
            None if self.completed.load(Ordering::Acquire) => Removal::Drained,
            None => Removal::Empty,
        }
    }

    fn wake_all(&self) {
        self.items_available.notify_waiters();
        self.space_available.notify_waiters();
    }
}

/// Queue statistics
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Event kind label
    pub kind: &'static str,

    pub policy: OverflowPolicy,

    /// Total events accepted
    pub enqueue_count: u64,

    /// Total events handed to consumers
    pub dequeue_count: u64,

    /// Buffered events displaced by a drop policy
    pub evict_count: u64,

    /// Incoming events refused (queue full)
    pub reject_count: u64,

    /// Approximate current size
    pub current_size: usize,

    /// Queue capacity
    pub capacity: usize,
}

impl QueueStats {
    /// Calculate fill percentage
    pub fn fill_percentage(&self) -> f64 {
        (self.current_size as f64 / self.capacity as f64) * 100.0
    }

    /// Percentage of offered events that were lost (evicted or refused)
    pub fn loss_rate(&self) -> f64 {
        let offered = self.enqueue_count + self.reject_count;
        if offered == 0 {
            0.0
        } else {
            ((self.evict_count + self.reject_count) as f64 / offered as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::require;
    use futures::StreamExt;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample(String);

    impl TraceEvent for Sample {
        const KIND: &'static str = "sample";

        fn trace_id(&self) -> &str {
            &self.0
        }

        fn validate(&self) -> QueueResult<()> {
            require(Self::KIND, "trace_id", &self.0)
        }
    }

    fn sample(id: &str) -> Sample {
        Sample(id.to_string())
    }

    fn queue(capacity: usize, policy: OverflowPolicy) -> EventQueue<Sample> {
        EventQueue::with_capacity(capacity, policy).unwrap()
    }

    fn ids(queue: &EventQueue<Sample>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = queue.try_dequeue().unwrap() {
            out.push(item.0);
        }
        out
    }

    #[test]
    fn test_queue_creation() {
        let queue: EventQueue<Sample> = EventQueue::new(OverflowPolicy::default());
        assert_eq!(queue.capacity(), DEFAULT_CAPACITY);
        assert_eq!(queue.policy(), OverflowPolicy::Wait);
        assert_eq!(queue.approx_size(), 0);
        assert_eq!(queue.kind(), "sample");
        assert!(!queue.is_completed());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = EventQueue::<Sample>::with_capacity(0, OverflowPolicy::Wait);
        assert!(matches!(result, Err(QueueError::InvalidArgument(_))));
    }

    #[test]
    fn test_push_pop_fifo() {
        let queue = queue(10, OverflowPolicy::Wait);

        for id in ["a", "b", "c"] {
            assert!(queue.try_enqueue(sample(id)).unwrap());
        }
        assert_eq!(queue.approx_size(), 3);

        assert_eq!(ids(&queue), vec!["a", "b", "c"]);
        assert_eq!(queue.approx_size(), 0);
    }

    #[test]
    fn test_invalid_item_rejected_before_mutation() {
        let queue = queue(2, OverflowPolicy::Wait);

        let result = queue.try_enqueue(sample("  "));
        assert!(matches!(result, Err(QueueError::InvalidArgument(_))));

        let stats = queue.stats();
        assert_eq!(stats.enqueue_count, 0);
        assert_eq!(stats.reject_count, 0);
        assert_eq!(queue.approx_size(), 0);
    }

    #[test]
    fn test_try_enqueue_full_returns_false() {
        let queue = queue(1, OverflowPolicy::Wait);

        assert!(queue.try_enqueue(sample("a")).unwrap());
        assert!(!queue.try_enqueue(sample("b")).unwrap());

        let stats = queue.stats();
        assert_eq!(stats.enqueue_count, 1);
        assert_eq!(stats.reject_count, 1);
        assert_eq!(ids(&queue), vec!["a"]);
    }

    #[test]
    fn test_enqueue_after_complete_returns_false() {
        let queue = queue(4, OverflowPolicy::Wait);
        queue.try_enqueue(sample("a")).unwrap();
        queue.complete();
        queue.complete(); // idempotent

        assert!(!queue.try_enqueue(sample("b")).unwrap());
        assert_eq!(queue.approx_size(), 1);
        assert!(queue.is_closed());
        assert!(!queue.is_completed());

        assert_eq!(ids(&queue), vec!["a"]);
        assert!(queue.is_completed());
    }

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let queue = queue(3, OverflowPolicy::DropOldest);
        for i in 1..=5 {
            assert!(queue.try_enqueue(sample(&i.to_string())).unwrap());
        }

        assert_eq!(queue.approx_size(), 3);
        assert_eq!(queue.stats().evict_count, 2);
        assert_eq!(ids(&queue), vec!["3", "4", "5"]);
    }

    #[test]
    fn test_drop_newest_replaces_last_buffered() {
        let queue = queue(3, OverflowPolicy::DropNewest);
        for i in 1..=5 {
            assert!(queue.try_enqueue(sample(&i.to_string())).unwrap());
        }

        assert_eq!(queue.stats().evict_count, 2);
        assert_eq!(ids(&queue), vec!["1", "2", "5"]);
    }

    #[test]
    fn test_reject_newest_refuses_and_counts() {
        let queue = queue(3, OverflowPolicy::RejectNewest);
        for i in 1..=3 {
            assert!(queue.try_enqueue(sample(&i.to_string())).unwrap());
        }
        assert!(!queue.try_enqueue(sample("4")).unwrap());
        assert!(!queue.try_enqueue(sample("5")).unwrap());

        let stats = queue.stats();
        assert_eq!(stats.reject_count, 2);
        assert_eq!(stats.evict_count, 0);
        assert!((stats.loss_rate() - 40.0).abs() < f64::EPSILON);
        assert_eq!(ids(&queue), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_dispose_fails_fast() {
        let queue = queue(4, OverflowPolicy::Wait);
        queue.try_enqueue(sample("a")).unwrap();
        queue.dispose();
        queue.dispose(); // idempotent

        assert_eq!(queue.try_enqueue(sample("b")), Err(QueueError::Disposed));
        assert_eq!(queue.try_dequeue(), Err(QueueError::Disposed));
        assert_eq!(queue.approx_size(), 0);
        assert!(queue.is_disposed());
        assert!(queue.is_completed());
    }

    #[test]
    fn test_stats() {
        let queue = queue(10, OverflowPolicy::Wait);
        queue.try_enqueue(sample("a")).unwrap();
        queue.try_enqueue(sample("b")).unwrap();
        queue.try_dequeue().unwrap();

        let stats = queue.stats();
        assert_eq!(stats.enqueue_count, 2);
        assert_eq!(stats.dequeue_count, 1);
        assert_eq!(stats.current_size, 1);
        assert!((stats.fill_percentage() - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_blocked_enqueue_resumes_after_dequeue() {
        let queue = Arc::new(queue(2, OverflowPolicy::Wait));
        let cancel = CancellationToken::new();

        assert!(queue.enqueue_blocking(sample("A"), &cancel).await.unwrap());
        assert!(queue.enqueue_blocking(sample("B"), &cancel).await.unwrap());

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                queue.enqueue_blocking(sample("C"), &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.approx_size(), 2);

        let first = queue.dequeue_blocking(&cancel).await.unwrap();
        assert_eq!(first, sample("A"));

        assert_eq!(producer.await.unwrap(), Ok(true));

        queue.complete();
        let rest: Vec<_> = queue
            .drain(&cancel)
            .map(|item| item.unwrap().0)
            .collect()
            .await;
        assert_eq!(rest, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_full_then_complete_drains_remaining() {
        let queue = queue(1, OverflowPolicy::Wait);
        let cancel = CancellationToken::new();

        assert!(queue.enqueue_blocking(sample("A"), &cancel).await.unwrap());
        assert!(!queue.try_enqueue(sample("B")).unwrap());

        queue.complete();
        assert!(!queue.try_enqueue(sample("C")).unwrap());

        let drained: Vec<_> = queue.drain(&cancel).collect().await;
        assert_eq!(drained, vec![Ok(sample("A"))]);
        assert!(queue.is_completed());
    }

    #[tokio::test]
    async fn test_complete_releases_waiting_producer() {
        let queue = Arc::new(queue(1, OverflowPolicy::Wait));
        queue.try_enqueue(sample("A")).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                queue.enqueue_blocking(sample("B"), &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.complete();

        let result = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer should not hang")
            .unwrap();
        assert_eq!(result, Ok(false));
        assert_eq!(queue.approx_size(), 1);
    }

    #[tokio::test]
    async fn test_dispose_releases_waiting_consumer() {
        let queue = Arc::new(queue(4, OverflowPolicy::Wait));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                queue.dequeue_blocking(&cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.dispose();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should not hang")
            .unwrap();
        assert_eq!(result, Err(QueueError::Disposed));

        let cancel = CancellationToken::new();
        assert_eq!(
            queue.enqueue_blocking(sample("late"), &cancel).await,
            Err(QueueError::Disposed)
        );
    }

    #[tokio::test]
    async fn test_cancelled_producer_leaves_queue_intact() {
        let queue = Arc::new(queue(1, OverflowPolicy::Wait));
        queue.try_enqueue(sample("A")).unwrap();

        let cancel = CancellationToken::new();
        let producer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.enqueue_blocking(sample("B"), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(producer.await.unwrap(), Err(QueueError::Cancelled));
        assert_eq!(queue.approx_size(), 1);
        assert_eq!(ids(&queue), vec!["A"]);
    }

    #[tokio::test]
    async fn test_deadlines_surface_as_cancelled() {
        let queue = queue(1, OverflowPolicy::Wait);

        assert_eq!(
            queue.dequeue_within(Duration::from_millis(20)).await,
            Err(QueueError::Cancelled)
        );

        queue.try_enqueue(sample("A")).unwrap();
        assert_eq!(
            queue.enqueue_within(sample("B"), Duration::from_millis(20)).await,
            Err(QueueError::Cancelled)
        );
        assert_eq!(queue.approx_size(), 1);
    }

    #[tokio::test]
    async fn test_lossy_policy_never_suspends() {
        let queue = queue(1, OverflowPolicy::DropOldest);
        let cancel = CancellationToken::new();

        assert!(queue.enqueue_blocking(sample("A"), &cancel).await.unwrap());
        let accepted = tokio::time::timeout(
            Duration::from_millis(100),
            queue.enqueue_blocking(sample("B"), &cancel),
        )
        .await
        .expect("drop policy must not wait");
        assert_eq!(accepted, Ok(true));
        assert_eq!(ids(&queue), vec!["B"]);
    }

    #[tokio::test]
    async fn test_drain_ends_with_cancelled() {
        let queue = queue(4, OverflowPolicy::Wait);
        queue.try_enqueue(sample("A")).unwrap();

        let cancel = CancellationToken::new();
        let stream = queue.drain(&cancel);
        tokio::pin!(stream);

        assert_eq!(stream.next().await, Some(Ok(sample("A"))));

        cancel.cancel();
        assert_eq!(stream.next().await, Some(Err(QueueError::Cancelled)));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_cancelled_drain_leaves_buffer_for_next_drain() {
        let queue = queue(4, OverflowPolicy::Wait);
        queue.try_enqueue(sample("A")).unwrap();
        queue.try_enqueue(sample("B")).unwrap();
        queue.complete();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let first: Vec<_> = queue.drain(&cancel).collect().await;
        assert_eq!(first, vec![Err(QueueError::Cancelled)]);
        assert!(!queue.is_completed());

        let fresh = CancellationToken::new();
        let second: Vec<_> = queue.drain(&fresh).collect().await;
        assert_eq!(second, vec![Ok(sample("A")), Ok(sample("B"))]);
        assert!(queue.is_completed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_and_consumers() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 250;
        const CONSUMERS: usize = 4;

        let queue = Arc::new(queue(16, OverflowPolicy::Wait));

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let cancel = CancellationToken::new();
                    let stream = queue.drain(&cancel);
                    tokio::pin!(stream);

                    let mut seen = Vec::new();
                    while let Some(item) = stream.next().await {
                        seen.push(item.unwrap().0);
                    }
                    seen
                })
            })
            .collect();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let cancel = CancellationToken::new();
                    for i in 0..PER_PRODUCER {
                        let accepted = queue
                            .enqueue_blocking(sample(&format!("{}-{}", p, i)), &cancel)
                            .await
                            .unwrap();
                        assert!(accepted);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.await.unwrap();
        }
        queue.complete();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }

        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
        assert_eq!(queue.approx_size(), 0);
        assert!(queue.is_completed());
    }

    proptest! {
        #[test]
        fn prop_fifo_and_size_match_model(
            capacity in 1usize..16,
            ops in proptest::collection::vec(any::<bool>(), 0..200),
        ) {
            let queue = queue(capacity, OverflowPolicy::Wait);
            let mut model = std::collections::VecDeque::new();
            let mut next_id = 0u32;

            for push in ops {
                if push {
                    let id = next_id.to_string();
                    next_id += 1;
                    let accepted = queue.try_enqueue(sample(&id)).unwrap();
                    prop_assert_eq!(accepted, model.len() < capacity);
                    if accepted {
                        model.push_back(id);
                    }
                } else {
                    let popped = queue.try_dequeue().unwrap().map(|p| p.0);
                    prop_assert_eq!(popped, model.pop_front());
                }

                prop_assert_eq!(queue.approx_size(), model.len());
                prop_assert!(queue.approx_size() <= capacity);
            }
        }
    }
}
