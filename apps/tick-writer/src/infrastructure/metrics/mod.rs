//! Prometheus Metrics Module
//!
//! Exposes ingest and writer metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Events**: submitted, dropped (by reason), decode faults
//! - **Flushes**: flush count, rows flushed, flush latency
//! - **Sink**: write failures and discarded rows
//! - **Feed**: frames received, connection state, reconnects
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::events::EventKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the already-installed handle.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Event counters
    describe_counter!(
        "tick_writer_events_submitted_total",
        "Total events accepted by the batching writer"
    );
    describe_counter!(
        "tick_writer_events_dropped_total",
        "Total events dropped before reaching a flush, by reason"
    );
    describe_counter!(
        "tick_writer_decode_errors_total",
        "Total feed messages that failed to decode"
    );

    // Flush counters
    describe_counter!("tick_writer_flushes_total", "Total non-empty flushes");
    describe_counter!(
        "tick_writer_rows_flushed_total",
        "Total rows handed to the storage sink successfully"
    );
    describe_histogram!(
        "tick_writer_flush_duration_seconds",
        "Time to drain buffers and write one batch to the sink"
    );

    // Sink counters
    describe_counter!(
        "tick_writer_sink_failures_total",
        "Total failed storage sink writes"
    );
    describe_counter!(
        "tick_writer_rows_discarded_total",
        "Total rows discarded after sink failures"
    );

    // Queue gauge
    describe_gauge!(
        "tick_writer_queue_depth",
        "Packets waiting in the writer's inbound queue"
    );

    // Feed
    describe_counter!(
        "tick_writer_feed_frames_total",
        "Total frames received from the feed"
    );
    describe_gauge!(
        "tick_writer_feed_connected",
        "Whether the feed connection is up (1) or down (0)"
    );
    describe_counter!(
        "tick_writer_reconnects_total",
        "Total feed reconnection attempts"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why an event never reached a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Rejected by a full bounded queue.
    QueueFull,
    /// Evicted from a full bounded queue by a newer packet.
    Displaced,
    /// Submitted after shutdown began.
    Closed,
    /// Trade with non-positive price or size.
    InvalidTrade,
    /// Event kind did not match its key's buffer.
    KindMismatch,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Displaced => "displaced",
            Self::Closed => "closed",
            Self::InvalidTrade => "invalid_trade",
            Self::KindMismatch => "kind_mismatch",
        }
    }
}

/// Record an event accepted by the writer.
pub fn record_event_submitted(kind: EventKind) {
    counter!(
        "tick_writer_events_submitted_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a dropped event.
pub fn record_event_dropped(reason: DropReason) {
    counter!(
        "tick_writer_events_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a feed message that failed to decode.
pub fn record_decode_error(message_type: &str) {
    counter!(
        "tick_writer_decode_errors_total",
        "message_type" => message_type.to_string()
    )
    .increment(1);
}

/// Record a successful flush.
pub fn record_flush(rows: usize, duration: Duration) {
    counter!("tick_writer_flushes_total").increment(1);
    counter!("tick_writer_rows_flushed_total").increment(rows as u64);
    histogram!("tick_writer_flush_duration_seconds").record(duration.as_secs_f64());
}

/// Record a failed sink write.
pub fn record_sink_failure() {
    counter!("tick_writer_sink_failures_total").increment(1);
}

/// Record rows discarded after sink failures.
pub fn record_rows_discarded(rows: usize) {
    counter!("tick_writer_rows_discarded_total").increment(rows as u64);
}

/// Update the inbound queue depth.
#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(depth: usize) {
    gauge!("tick_writer_queue_depth").set(depth as f64);
}

/// Record a frame received from the feed.
pub fn record_feed_frame() {
    counter!("tick_writer_feed_frames_total").increment(1);
}

/// Update the feed connection state.
pub fn set_feed_connected(connected: bool) {
    gauge!("tick_writer_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a feed reconnection attempt.
pub fn record_reconnect() {
    counter!("tick_writer_reconnects_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
