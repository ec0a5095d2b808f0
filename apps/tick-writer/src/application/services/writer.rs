//! Batching Writer
//!
//! One consumer task per writer. The task waits on a single select point
//! over the inbound queue, a periodic flush ticker and a cancellation
//! token:
//!
//! - packet: append to the accumulator
//! - tick: drain the accumulator and hand the batch to the storage sink
//! - cancel: drain whatever is still queued, flush once more and exit
//!
//! The ticker is periodic rather than reset per packet, so a steady stream
//! of packets cannot postpone flushes indefinitely.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::accumulator::BatchAccumulator;
use super::queue::{InboundQueue, PushOutcome, QueueConfig};
use crate::application::ports::StorageSink;
use crate::domain::columns::ColumnSeriesMap;
use crate::domain::events::{EventKind, WritePacket};
use crate::infrastructure::metrics::{self, DropReason};

/// Default flush cadence.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of write attempts for a retained batch.
pub const DEFAULT_SINK_MAX_ATTEMPTS: u32 = 3;

/// Result of [`BatchingWriter::submit`].
pub type SubmitOutcome = PushOutcome;

// =============================================================================
// Configuration
// =============================================================================

/// What happens to a batch the sink failed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFailurePolicy {
    /// Drop the batch.
    Discard,
    /// Keep the batch and prepend it to the next flush, giving up after
    /// `max_attempts` consecutive failed flushes.
    ///
    /// Rows drained while a batch is retained are merged into it and share
    /// its failure count, so a give-up discards them too.
    Retain {
        /// Consecutive failed flushes before the retained rows are discarded.
        max_attempts: u32,
    },
}

impl Default for SinkFailurePolicy {
    fn default() -> Self {
        Self::Retain {
            max_attempts: DEFAULT_SINK_MAX_ATTEMPTS,
        }
    }
}

impl SinkFailurePolicy {
    /// Parse a policy name (`retain`, `discard`).
    #[must_use]
    pub fn parse(s: &str, max_attempts: u32) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "retain" => Some(Self::Retain {
                max_attempts: max_attempts.max(1),
            }),
            "discard" => Some(Self::Discard),
            _ => None,
        }
    }
}

/// Writer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Time between flushes.
    pub flush_interval: Duration,
    /// Inbound queue sizing.
    pub queue: QueueConfig,
    /// Sink failure handling.
    pub sink_failure: SinkFailurePolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue: QueueConfig::unbounded(),
            sink_failure: SinkFailurePolicy::default(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Writer counters, updated lock-free.
#[derive(Debug, Default)]
pub struct WriterStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    appended: AtomicU64,
    flushes: AtomicU64,
    rows_flushed: AtomicU64,
    sink_failures: AtomicU64,
    rows_discarded: AtomicU64,
}

/// Point-in-time copy of [`WriterStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WriterStatsSnapshot {
    /// Packets accepted by the queue.
    pub submitted: u64,
    /// Packets rejected, evicted or refused as malformed.
    pub dropped: u64,
    /// Events appended to open buffers.
    pub appended: u64,
    /// Successful non-empty flushes.
    pub flushes: u64,
    /// Rows written by successful flushes.
    pub rows_flushed: u64,
    /// Failed sink writes.
    pub sink_failures: u64,
    /// Rows lost to sink failures.
    pub rows_discarded: u64,
}

impl WriterStats {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Take a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            appended: self.appended.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            rows_flushed: self.rows_flushed.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            rows_discarded: self.rows_discarded.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Writer
// =============================================================================

#[derive(Debug)]
struct Shared {
    queue: InboundQueue<WritePacket>,
    accumulator: BatchAccumulator,
    stats: WriterStats,
}

/// Micro-batching writer with a single consumer task.
#[derive(Debug)]
pub struct BatchingWriter {
    shared: Arc<Shared>,
    config: WriterConfig,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BatchingWriter {
    /// Start the writer and its consumer task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start(config: WriterConfig, sink: Arc<dyn StorageSink>) -> Self {
        let shared = Arc::new(Shared {
            queue: InboundQueue::new(config.queue),
            accumulator: BatchAccumulator::new(),
            stats: WriterStats::default(),
        });
        let cancel = CancellationToken::new();

        let flush_loop = FlushLoop {
            shared: Arc::clone(&shared),
            sink,
            policy: config.sink_failure,
            retained: None,
        };
        let task = tokio::spawn(flush_loop.run(config.flush_interval, cancel.clone()));

        tracing::info!(
            flush_interval_ms = config.flush_interval.as_millis(),
            capacity = ?config.queue.capacity,
            overflow = config.queue.overflow.as_str(),
            sink_failure = ?config.sink_failure,
            "Batching writer started"
        );

        Self {
            shared,
            config,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Queue a packet for the consumer task.
    ///
    /// Never blocks unless the queue is bounded with
    /// [`OverflowPolicy::Block`](super::queue::OverflowPolicy::Block), in
    /// which case it parks the calling thread. Producers running on the
    /// runtime use [`submit_wait`](Self::submit_wait).
    ///
    /// # Panics
    ///
    /// Debug builds panic if the event kind does not match the key's record
    /// kind. Release builds reject the packet.
    pub fn submit(&self, packet: WritePacket) -> SubmitOutcome {
        if !self.admit(&packet) {
            return PushOutcome::Rejected;
        }
        let kind = packet.event.kind();
        let outcome = self.shared.queue.push(packet);
        self.record(kind, outcome);
        outcome
    }

    /// Queue a packet, awaiting space when a bounded `Block` queue is full.
    ///
    /// Identical to [`submit`](Self::submit) under every other policy.
    ///
    /// # Panics
    ///
    /// Same kind check as [`submit`](Self::submit).
    pub async fn submit_wait(&self, packet: WritePacket) -> SubmitOutcome {
        if !self.admit(&packet) {
            return PushOutcome::Rejected;
        }
        let kind = packet.event.kind();
        let outcome = self.shared.queue.push_wait(packet).await;
        self.record(kind, outcome);
        outcome
    }

    /// Kind check on the producer side, so a bad packet never reaches the
    /// consumer task.
    fn admit(&self, packet: &WritePacket) -> bool {
        let expected = packet.key.record().event_kind();
        let found = packet.event.kind();
        debug_assert_eq!(
            expected, found,
            "kind mismatch for {}: key holds {expected}, got {found}",
            packet.key
        );
        if expected == found {
            return true;
        }

        tracing::error!(key = %packet.key, %expected, %found, "Rejecting packet with mismatched kind");
        WriterStats::add(&self.shared.stats.dropped, 1);
        metrics::record_event_dropped(DropReason::KindMismatch);
        false
    }

    fn record(&self, kind: EventKind, outcome: PushOutcome) {
        let stats = &self.shared.stats;
        match outcome {
            PushOutcome::Enqueued => {
                WriterStats::add(&stats.submitted, 1);
                metrics::record_event_submitted(kind);
            }
            PushOutcome::DisplacedOldest => {
                WriterStats::add(&stats.submitted, 1);
                WriterStats::add(&stats.dropped, 1);
                metrics::record_event_submitted(kind);
                metrics::record_event_dropped(DropReason::Displaced);
            }
            PushOutcome::Rejected => {
                WriterStats::add(&stats.dropped, 1);
                metrics::record_event_dropped(DropReason::QueueFull);
            }
            PushOutcome::Closed => {
                WriterStats::add(&stats.dropped, 1);
                metrics::record_event_dropped(DropReason::Closed);
                tracing::debug!(%kind, "Packet submitted after shutdown");
            }
        }
    }

    /// Stop accepting packets, flush everything already queued and wait
    /// for the consumer task to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.shared.queue.close();
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Batching writer task failed");
            }
            tracing::info!(stats = ?self.stats(), "Batching writer stopped");
        }
    }

    /// Writer configuration.
    #[must_use]
    pub const fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> WriterStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Packets waiting to be consumed.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Events buffered since the last flush.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.shared.accumulator.pending_events()
    }

    /// Whether the consumer task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for BatchingWriter {
    fn drop(&mut self) {
        self.shared.queue.close();
        self.cancel.cancel();
    }
}

// =============================================================================
// Consumer Task
// =============================================================================

struct Retained {
    batch: ColumnSeriesMap,
    attempts: u32,
}

struct FlushLoop {
    shared: Arc<Shared>,
    sink: Arc<dyn StorageSink>,
    policy: SinkFailurePolicy,
    retained: Option<Retained>,
}

impl FlushLoop {
    async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let shared = Arc::clone(&self.shared);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                packet = shared.queue.recv() => match packet {
                    Some(packet) => self.append(packet),
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
            }
        }

        while let Some(packet) = shared.queue.try_recv() {
            self.append(packet);
        }
        self.flush().await;

        if let Some(retained) = self.retained.take() {
            let rows = retained.batch.total_rows();
            tracing::error!(rows, attempts = retained.attempts, "Discarding retained batch at shutdown");
            self.discard(rows);
        }
    }

    fn append(&self, packet: WritePacket) {
        let stats = &self.shared.stats;
        if self.shared.accumulator.append(&packet.key, packet.event).is_ok() {
            WriterStats::add(&stats.appended, 1);
        } else {
            WriterStats::add(&stats.dropped, 1);
            metrics::record_event_dropped(DropReason::KindMismatch);
        }
    }

    async fn flush(&mut self) {
        let started = std::time::Instant::now();
        let fresh = self.shared.accumulator.drain();
        metrics::set_queue_depth(self.shared.queue.len());

        let (batch, attempts) = match self.retained.take() {
            Some(Retained { mut batch, attempts }) => {
                batch.merge(fresh);
                (batch, attempts)
            }
            None => (fresh, 0),
        };
        if batch.is_empty() {
            return;
        }

        let rows = batch.total_rows();
        let stats = &self.shared.stats;
        match self.sink.write(&batch).await {
            Ok(()) => {
                WriterStats::add(&stats.flushes, 1);
                WriterStats::add(&stats.rows_flushed, rows);
                metrics::record_flush(rows, started.elapsed());
                tracing::trace!(streams = batch.len(), rows, "Flushed batch");
            }
            Err(e) => {
                WriterStats::add(&stats.sink_failures, 1);
                metrics::record_sink_failure();
                let attempts = attempts + 1;

                match self.policy {
                    SinkFailurePolicy::Discard => {
                        tracing::warn!(rows, error = %e, "Sink write failed, discarding batch");
                        self.discard(rows);
                    }
                    SinkFailurePolicy::Retain { max_attempts } if attempts >= max_attempts => {
                        tracing::error!(rows, attempts, error = %e, "Sink write failed, giving up on batch");
                        self.discard(rows);
                    }
                    SinkFailurePolicy::Retain { max_attempts } => {
                        tracing::warn!(rows, attempts, max_attempts, error = %e, "Sink write failed, retaining batch");
                        self.retained = Some(Retained { batch, attempts });
                    }
                }
            }
        }
    }

    fn discard(&self, rows: usize) {
        WriterStats::add(&self.shared.stats.rows_discarded, rows);
        metrics::record_rows_discarded(rows);
    }
}

// =============================================================================
// Tests
// =============================================================================
