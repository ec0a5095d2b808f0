//! Storage Sinks
//!
//! Implementations of [`StorageSink`]:
//!
//! - [`LoggingSink`]: logs a one-line summary per stream
//! - [`JsonLinesSink`]: appends one JSON document per stream per flush
//! - [`MemorySink`]: keeps every batch in memory

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::application::ports::{SinkError, StorageSink};
use crate::domain::columns::{ColumnSeries, ColumnSeriesMap};
use crate::domain::events::TimeBucketKey;

// =============================================================================
// Logging Sink
// =============================================================================

/// Logs each flushed stream at info level and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl LoggingSink {
    /// Create a logging sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageSink for LoggingSink {
    async fn write(&self, batch: &ColumnSeriesMap) -> Result<(), SinkError> {
        for (key, series) in batch.iter() {
            tracing::info!(
                key = %key,
                rows = series.len(),
                columns = ?series.names().collect::<Vec<_>>(),
                "Flushed stream"
            );
        }
        Ok(())
    }
}

// =============================================================================
// JSON Lines Sink
// =============================================================================

#[derive(Serialize)]
struct StreamRecord<'a> {
    key: &'a TimeBucketKey,
    columns: &'a ColumnSeries,
}

/// Appends batches to a file, one line per stream per flush:
///
/// ```json
/// {"key":"AAPL/1Min/TRADE","columns":{"Epoch":[1700000000],"Nanoseconds":[500000],"Price":[150.25],"Size":[10]}}
/// ```
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        tracing::info!(path = %path.display(), "Opened JSON lines sink");
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    /// File being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StorageSink for JsonLinesSink {
    async fn write(&self, batch: &ColumnSeriesMap) -> Result<(), SinkError> {
        // Encode everything first so a failure leaves the file untouched.
        let mut buf = Vec::new();
        for (key, columns) in batch.iter() {
            serde_json::to_writer(&mut buf, &StreamRecord { key, columns })?;
            buf.push(b'\n');
        }

        let mut file = self.file.lock().await;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}

// =============================================================================
// Memory Sink
// =============================================================================

/// Keeps every successfully written batch.
///
/// `fail_next` makes the next N writes fail without recording anything.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<ColumnSeriesMap>>,
    failures_left: AtomicUsize,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` writes.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Every recorded batch, in write order.
    #[must_use]
    pub fn batches(&self) -> Vec<ColumnSeriesMap> {
        self.batches.lock().clone()
    }

    /// Rows across all recorded batches.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.batches.lock().iter().map(ColumnSeriesMap::total_rows).sum()
    }

    /// All recorded batches concatenated per stream, in write order.
    #[must_use]
    pub fn merged(&self) -> ColumnSeriesMap {
        let mut merged = ColumnSeriesMap::new();
        for batch in self.batches.lock().iter() {
            merged.merge(batch.clone());
        }
        merged
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    async fn write(&self, batch: &ColumnSeriesMap) -> Result<(), SinkError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SinkError::WriteFailed("injected failure".to_string()));
        }

        self.batches.lock().push(batch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{EventTime, Trade};

    fn batch(symbol: &str, prices: &[f32]) -> ColumnSeriesMap {
        let trades: Vec<_> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                Trade::new(
                    EventTime {
                        epoch: 1_700_000_000 + i64::try_from(i).unwrap(),
                        nanos: 0,
                    },
                    p,
                    1,
                )
            })
            .collect();
        let mut map = ColumnSeriesMap::new();
        map.insert(TimeBucketKey::trade(symbol), ColumnSeries::from_trades(&trades));
        map
    }

    #[tokio::test]
    async fn memory_sink_records_and_merges() {
        let sink = MemorySink::new();
        sink.write(&batch("AAPL", &[1.0, 2.0])).await.unwrap();
        sink.write(&batch("AAPL", &[3.0])).await.unwrap();

        assert_eq!(sink.batches().len(), 2);
        assert_eq!(sink.total_rows(), 3);

        let merged = sink.merged();
        let prices = merged
            .get(&TimeBucketKey::trade("AAPL"))
            .unwrap()
            .column(crate::domain::columns::PRICE)
            .unwrap()
            .as_f32()
            .unwrap()
            .to_vec();
        assert_eq!(prices, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn memory_sink_injected_failures() {
        let sink = MemorySink::new();
        sink.fail_next(2);

        assert!(sink.write(&batch("AAPL", &[1.0])).await.is_err());
        assert!(sink.write(&batch("AAPL", &[1.0])).await.is_err());
        assert!(sink.write(&batch("AAPL", &[1.0])).await.is_ok());
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn logging_sink_accepts_everything() {
        assert!(LoggingSink::new().write(&batch("IBM", &[5.0])).await.is_ok());
    }

    #[tokio::test]
    async fn json_lines_sink_appends_one_line_per_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.jsonl");

        let sink = JsonLinesSink::open(&path).await.unwrap();
        let mut first = batch("AAPL", &[150.25]);
        first.merge(batch("MSFT", &[300.0, 301.0]));
        sink.write(&first).await.unwrap();
        sink.write(&batch("AAPL", &[151.0])).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["key"], "AAPL/1Min/TRADE");
        assert_eq!(lines[0]["columns"]["Epoch"], serde_json::json!([1_700_000_000]));
        assert_eq!(lines[0]["columns"]["Price"], serde_json::json!([150.25]));
        assert_eq!(lines[1]["key"], "MSFT/1Min/TRADE");
        assert_eq!(lines[1]["columns"]["Size"], serde_json::json!([1, 1]));
        assert_eq!(lines[2]["columns"]["Price"], serde_json::json!([151.0]));
    }

    #[tokio::test]
    async fn json_lines_sink_reopens_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.jsonl");

        JsonLinesSink::open(&path)
            .await
            .unwrap()
            .write(&batch("AAPL", &[1.0]))
            .await
            .unwrap();
        let sink = JsonLinesSink::open(&path).await.unwrap();
        sink.write(&batch("AAPL", &[2.0])).await.unwrap();
        assert_eq!(sink.path(), path.as_path());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
