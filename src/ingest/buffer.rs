//! Batching ingestion buffer
//!
//! Accumulates inbound records and flushes them as bulk inserts. A flush
//! happens when a single `add` brings the pending count to the batch
//! threshold, or when the recurring timer fires, whichever comes first.
//!
//! The pending queue is guarded by one mutex, held only for the
//! in-memory swap - never across the bulk-insert I/O - so producer
//! contention stays bounded regardless of backend latency.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::ingest::BulkInsert;
use crate::storage::{LogRecord, StorageResult};

/// Buffer tuning knobs, externally supplied
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Pending count that triggers an immediate flush (default: 1000)
    pub batch_size: usize,
    /// Recurring flush interval (default: 5s)
    pub flush_interval: Duration,
    /// Hard bound on pending records; oldest are dropped beyond this
    /// (default: 100,000)
    pub max_pending: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            flush_interval: Duration::from_secs(5),
            max_pending: 100_000,
        }
    }
}

/// Read-only counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    /// Records currently queued
    pub pending: usize,
    /// Cumulative records dropped under pressure
    pub dropped: u64,
    /// Cumulative flush operations attempted
    pub flushes: u64,
    /// Cumulative records successfully inserted
    pub inserted: u64,
}

/// The batching ingestion buffer
pub struct LogBuffer {
    config: BufferConfig,
    sink: Arc<dyn BulkInsert>,
    queue: Mutex<VecDeque<LogRecord>>,
    closed: AtomicBool,
    shutdown: Notify,
    dropped: AtomicU64,
    flushes: AtomicU64,
    inserted: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl LogBuffer {
    /// Create a buffer without the background timer (flushes happen only
    /// on the batch-size trigger or explicit `flush` calls)
    pub fn new(config: BufferConfig, sink: Arc<dyn BulkInsert>) -> Arc<Self> {
        Arc::new(Self {
            config,
            sink,
            queue: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            dropped: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            inserted: AtomicU64::new(0),
            timer: Mutex::new(None),
        })
    }

    /// Create a buffer and start the recurring flush timer
    pub fn start(config: BufferConfig, sink: Arc<dyn BulkInsert>) -> Arc<Self> {
        let interval = config.flush_interval;
        let buffer = Self::new(config, sink);

        let worker = Arc::clone(&buffer);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            // The first tick completes immediately; skip it
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if worker.closed.load(Ordering::Acquire) {
                            break;
                        }
                        if let Err(e) = worker.flush().await {
                            tracing::warn!("Timed flush failed: {}", e);
                        }
                    }
                    _ = worker.shutdown.notified() => break,
                }
            }
        });

        *lock_ignore_poison(&buffer.timer) = Some(handle);
        buffer
    }

    /// Queue records for insertion
    ///
    /// Silently a no-op after `close`. Never returns an error: a full
    /// queue evicts oldest-first, and a failed size-triggered flush is
    /// logged and retried by later flushes.
    pub async fn add(&self, records: Vec<LogRecord>) {
        if records.is_empty() || self.closed.load(Ordering::Acquire) {
            return;
        }

        let should_flush = {
            let mut queue = lock_ignore_poison(&self.queue);
            queue.extend(records);
            self.evict_over_capacity(&mut queue);
            queue.len() >= self.config.batch_size
        };

        if should_flush {
            if let Err(e) = self.flush().await {
                tracing::warn!("Batch-triggered flush failed: {}", e);
            }
        }
    }

    /// Flush all pending records to the sink
    ///
    /// On failure the batch is requeued at the front of whatever has
    /// accumulated since, the capacity bound is reapplied, and the error
    /// is returned. The buffer keeps running either way.
    pub async fn flush(&self) -> StorageResult<()> {
        let batch: Vec<LogRecord> = {
            let mut queue = lock_ignore_poison(&self.queue);
            if queue.is_empty() {
                return Ok(());
            }
            queue.drain(..).collect()
        };

        self.flushes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Flushing {} records", batch.len());

        // Bulk insert runs outside the lock; producers keep appending
        match self.sink.insert_logs(&batch).await {
            Ok(n) => {
                self.inserted.fetch_add(n, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Bulk insert of {} records failed: {}", batch.len(), e);
                let mut queue = lock_ignore_poison(&self.queue);
                for record in batch.into_iter().rev() {
                    queue.push_front(record);
                }
                self.evict_over_capacity(&mut queue);
                Err(e)
            }
        }
    }

    /// Stop the timer, run a final flush, and refuse further work
    ///
    /// Waits for the timer task to finish before the final flush: a
    /// timer-driven flush that already took a batch must complete its
    /// insert (or requeue on failure) rather than be cancelled mid-I/O.
    /// Does not return until the final flush completes, success or not.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let handle = lock_ignore_poison(&self.timer).take();
        if let Some(handle) = handle {
            // notify_one stores a permit, so the signal is not lost even
            // if the timer task is mid-flush rather than parked
            self.shutdown.notify_one();
            if let Err(e) = handle.await {
                tracing::warn!("Timer task ended abnormally: {}", e);
            }
        }

        if let Err(e) = self.flush().await {
            tracing::warn!("Final flush on close failed: {}", e);
        }
    }

    /// Counter snapshot, safe to call concurrently with add/flush
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            pending: lock_ignore_poison(&self.queue).len(),
            dropped: self.dropped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
        }
    }

    /// Drop oldest entries until the queue fits the bound again
    fn evict_over_capacity(&self, queue: &mut VecDeque<LogRecord>) {
        let over = queue.len().saturating_sub(self.config.max_pending);
        if over > 0 {
            queue.drain(..over);
            self.dropped.fetch_add(over as u64, Ordering::Relaxed);
            tracing::warn!(
                "Buffer over capacity, dropped {} oldest records (bound {})",
                over,
                self.config.max_pending
            );
        }
    }
}

/// A poisoned queue lock only means another thread panicked mid-append;
/// the queue itself is still structurally sound for a log buffer.
fn lock_ignore_poison<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Sink that records batches, can fail the first N calls, and can
    /// hold every insert open for a fixed delay
    struct MockSink {
        fail_first: AtomicUsize,
        calls: AtomicUsize,
        received: Mutex<Vec<LogRecord>>,
        delay: Duration,
    }

    impl MockSink {
        fn new() -> Arc<Self> {
            Self::failing(0)
        }

        fn failing(times: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_first: AtomicUsize::new(times),
                calls: AtomicUsize::new(0),
                received: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                fail_first: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                received: Mutex::new(Vec::new()),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn received(&self) -> Vec<LogRecord> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BulkInsert for MockSink {
        async fn insert_logs(&self, records: &[LogRecord]) -> StorageResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::Backend("injected failure".into()));
            }
            self.received.lock().unwrap().extend_from_slice(records);
            Ok(records.len() as u64)
        }
    }

    fn records(n: usize) -> Vec<LogRecord> {
        (0..n)
            .map(|i| LogRecord::new("info", format!("event {i}")).file("test.log", i as u32))
            .collect()
    }

    #[tokio::test]
    async fn test_backpressure_drops_oldest() {
        let sink = MockSink::new();
        let buffer = LogBuffer::new(
            BufferConfig {
                batch_size: 1000,
                max_pending: 100,
                ..Default::default()
            },
            sink.clone(),
        );

        buffer.add(records(150)).await;

        let stats = buffer.stats();
        assert_eq!(stats.pending, 100);
        assert_eq!(stats.dropped, 50);
        assert_eq!(sink.calls(), 0);

        // Oldest went first: records 0..50 are gone
        let front = lock_ignore_poison(&buffer.queue)
            .front()
            .map(|r| r.line_number);
        assert_eq!(front, Some(50));
    }

    #[tokio::test]
    async fn test_batch_size_triggers_flush() {
        let sink = MockSink::new();
        let buffer = LogBuffer::new(
            BufferConfig {
                batch_size: 10,
                ..Default::default()
            },
            sink.clone(),
        );

        buffer.add(records(9)).await;
        assert_eq!(sink.calls(), 0);
        assert_eq!(buffer.stats().pending, 9);

        buffer.add(records(1)).await;
        assert_eq!(sink.calls(), 1);

        let stats = buffer.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.inserted, 10);
    }

    #[tokio::test]
    async fn test_timer_flushes_partial_batch() {
        let sink = MockSink::new();
        let buffer = LogBuffer::start(
            BufferConfig {
                batch_size: 1000,
                flush_interval: Duration::from_millis(50),
                ..Default::default()
            },
            sink.clone(),
        );

        buffer.add(records(5)).await;
        assert_eq!(sink.calls(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(buffer.stats().pending, 0);
        assert_eq!(buffer.stats().inserted, 5);

        buffer.close().await;
    }

    #[tokio::test]
    async fn test_failed_flush_requeues() {
        let sink = MockSink::failing(1);
        let buffer = LogBuffer::new(
            BufferConfig {
                batch_size: 5,
                ..Default::default()
            },
            sink.clone(),
        );

        let batch = records(5);
        let ids: Vec<_> = batch.iter().map(|r| r.id).collect();

        // Size-triggered flush fails; records are requeued, add still "succeeds"
        buffer.add(batch).await;
        assert_eq!(sink.calls(), 1);
        let stats = buffer.stats();
        assert_eq!(stats.pending, 5);
        assert_eq!(stats.inserted, 0);

        // Next attempt delivers the same records
        buffer.flush().await.unwrap();
        let stats = buffer.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.inserted, 5);
        assert_eq!(stats.flushes, 2);

        let delivered: Vec<_> = sink.received().iter().map(|r| r.id).collect();
        assert_eq!(delivered, ids);
    }

    #[tokio::test]
    async fn test_requeue_respects_capacity() {
        let sink = MockSink::failing(1);
        let buffer = LogBuffer::new(
            BufferConfig {
                batch_size: 100,
                max_pending: 8,
                ..Default::default()
            },
            sink.clone(),
        );

        buffer.add(records(8)).await;
        buffer.flush().await.unwrap_err();

        // Requeued batch still fits the bound
        let stats = buffer.stats();
        assert_eq!(stats.pending, 8);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn test_close_runs_final_flush() {
        let sink = MockSink::new();
        let buffer = LogBuffer::new(BufferConfig::default(), sink.clone());

        buffer.add(records(3)).await;
        buffer.close().await;

        assert_eq!(buffer.stats().pending, 0);
        assert_eq!(buffer.stats().inserted, 3);

        // Closed buffer silently ignores further work
        buffer.add(records(3)).await;
        assert_eq!(buffer.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_close_waits_for_inflight_timer_flush() {
        let sink = MockSink::slow(Duration::from_millis(200));
        let buffer = LogBuffer::start(
            BufferConfig {
                batch_size: 1000,
                flush_interval: Duration::from_millis(30),
                ..Default::default()
            },
            sink.clone(),
        );

        buffer.add(records(5)).await;

        // Let the timer flush take the batch and block inside the sink
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(sink.calls(), 1);

        // close must wait for that insert, not cancel it mid-flight
        buffer.close().await;

        let stats = buffer.stats();
        assert_eq!(stats.inserted, 5);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.dropped, 0);
        assert_eq!(sink.received().len(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        let sink = MockSink::new();
        let buffer = LogBuffer::new(
            BufferConfig {
                batch_size: 10_000,
                ..Default::default()
            },
            sink.clone(),
        );

        let mut handles = Vec::new();
        for _ in 0..10 {
            let b = Arc::clone(&buffer);
            handles.push(tokio::spawn(async move {
                b.add(records(10)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(buffer.stats().pending, 100);
        buffer.flush().await.unwrap();
        assert_eq!(buffer.stats().inserted, 100);
    }
}
