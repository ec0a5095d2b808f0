//! Batch Accumulator
//!
//! Per-key open buffers of row-oriented events, transposed into column
//! arrays on drain. A key's first event fixes the buffer's kind for the
//! life of the process; buffers are cleared in place and never removed,
//! so a key stays warm across flushes.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::domain::columns::{ColumnSeries, ColumnSeriesMap};
use crate::domain::events::{EventKind, MarketEvent, QuoteUpdate, TimeBucketKey, Trade};

/// Accumulator errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccumulatorError {
    /// Event kind differs from the kind already established for the key.
    #[error("kind mismatch for {key}: buffer holds {expected}, got {found}")]
    KindMismatch {
        /// Offending key.
        key: TimeBucketKey,
        /// Kind established by the key's first event.
        expected: EventKind,
        /// Kind of the rejected event.
        found: EventKind,
    },
}

#[derive(Debug)]
enum OpenBuffer {
    Trades(Vec<Trade>),
    Quotes(Vec<QuoteUpdate>),
}

impl OpenBuffer {
    fn for_event(event: &MarketEvent) -> Self {
        match event {
            MarketEvent::Trade(_) => Self::Trades(Vec::new()),
            MarketEvent::Quote(_) => Self::Quotes(Vec::new()),
        }
    }

    const fn kind(&self) -> EventKind {
        match self {
            Self::Trades(_) => EventKind::Trade,
            Self::Quotes(_) => EventKind::Quote,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Trades(rows) => rows.len(),
            Self::Quotes(rows) => rows.len(),
        }
    }

    /// Returns the event back if its kind does not match.
    fn push(&mut self, event: MarketEvent) -> Result<(), MarketEvent> {
        match (self, event) {
            (Self::Trades(rows), MarketEvent::Trade(trade)) => rows.push(trade),
            (Self::Quotes(rows), MarketEvent::Quote(quote)) => rows.push(quote),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    /// Transpose into columns and clear, keeping the allocation.
    fn take_series(&mut self) -> ColumnSeries {
        match self {
            Self::Trades(rows) => {
                let series = ColumnSeries::from_trades(rows);
                rows.clear();
                series
            }
            Self::Quotes(rows) => {
                let series = ColumnSeries::from_quotes(rows);
                rows.clear();
                series
            }
        }
    }
}

/// Lock-guarded map of open buffers.
///
/// One lock covers the whole map for a single append or a full drain.
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    buffers: Mutex<HashMap<TimeBucketKey, OpenBuffer>>,
}

impl BatchAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event to the buffer for `key`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`AccumulatorError::KindMismatch`] if `key` already holds a
    /// different event kind. The buffer is left untouched.
    pub fn append(&self, key: &TimeBucketKey, event: MarketEvent) -> Result<(), AccumulatorError> {
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .entry(key.clone())
            .or_insert_with(|| OpenBuffer::for_event(&event));

        let expected = buffer.kind();
        if let Err(rejected) = buffer.push(event) {
            drop(buffers);
            let err = AccumulatorError::KindMismatch {
                key: key.clone(),
                expected,
                found: rejected.kind(),
            };
            tracing::error!(key = %key, %expected, found = %rejected.kind(), "Dropping event with mismatched kind");
            return Err(err);
        }
        Ok(())
    }

    /// Transpose every non-empty buffer into columns and clear it.
    ///
    /// Keys stay in the map with empty buffers.
    #[must_use]
    pub fn drain(&self) -> ColumnSeriesMap {
        let mut batch = ColumnSeriesMap::new();
        let mut buffers = self.buffers.lock();
        for (key, buffer) in buffers.iter_mut() {
            if buffer.len() == 0 {
                continue;
            }
            batch.insert(key.clone(), buffer.take_series());
        }
        batch
    }

    /// Number of keys with a buffer (warm keys included).
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Total events buffered across all keys.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.buffers.lock().values().map(OpenBuffer::len).sum()
    }

    /// Buffered event count for `key` (`None` if the key was never seen).
    #[must_use]
    pub fn buffer_len(&self, key: &TimeBucketKey) -> Option<usize> {
        self.buffers.lock().get(key).map(OpenBuffer::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::columns::{ASK_PRICE, EPOCH, PRICE, SIZE};
    use crate::domain::events::{Bbo, BookEntry, EventTime};

    fn trade(epoch: i64, price: f32, size: i32) -> MarketEvent {
        Trade::new(EventTime { epoch, nanos: 0 }, price, size).into()
    }

    fn quote(epoch: i64, bid: f32, ask: f32) -> MarketEvent {
        let bbo = Bbo {
            bid: BookEntry::new(bid, 1),
            ask: BookEntry::new(ask, 1),
        };
        QuoteUpdate::from_bbo(EventTime { epoch, nanos: 0 }, bbo).into()
    }

    #[test]
    fn append_creates_buffer_lazily() {
        let acc = BatchAccumulator::new();
        let key = TimeBucketKey::trade("AAPL");
        assert_eq!(acc.buffer_len(&key), None);

        acc.append(&key, trade(1, 10.0, 1)).unwrap();
        assert_eq!(acc.buffer_len(&key), Some(1));
        assert_eq!(acc.key_count(), 1);
    }

    #[test]
    fn drain_preserves_append_order() {
        let acc = BatchAccumulator::new();
        let key = TimeBucketKey::trade("AAPL");
        for i in 0..5 {
            acc.append(&key, trade(i, 100.0 + i as f32, 1 + i as i32)).unwrap();
        }

        let batch = acc.drain();
        let series = batch.get(&key).unwrap();
        assert_eq!(series.len(), 5);
        assert_eq!(series.column(EPOCH).unwrap().as_i64().unwrap(), &[0, 1, 2, 3, 4]);
        assert_eq!(
            series.column(PRICE).unwrap().as_f32().unwrap(),
            &[100.0, 101.0, 102.0, 103.0, 104.0]
        );
        assert_eq!(series.column(SIZE).unwrap().as_i32().unwrap(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn drain_keeps_keys_warm() {
        let acc = BatchAccumulator::new();
        let key = TimeBucketKey::trade("AAPL");
        acc.append(&key, trade(1, 10.0, 1)).unwrap();
        acc.append(&key, trade(2, 11.0, 1)).unwrap();

        let first = acc.drain();
        assert_eq!(first.get(&key).unwrap().len(), 2);
        assert_eq!(acc.buffer_len(&key), Some(0));
        assert_eq!(acc.pending_events(), 0);

        acc.append(&key, trade(3, 12.0, 1)).unwrap();
        let second = acc.drain();
        let series = second.get(&key).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.column(EPOCH).unwrap().as_i64().unwrap(), &[3]);
    }

    #[test]
    fn drain_skips_empty_buffers() {
        let acc = BatchAccumulator::new();
        let aapl = TimeBucketKey::trade("AAPL");
        let msft = TimeBucketKey::quote("MSFT");
        acc.append(&aapl, trade(1, 10.0, 1)).unwrap();
        acc.append(&msft, quote(1, 9.0, 10.0)).unwrap();
        let _ = acc.drain();

        acc.append(&msft, quote(2, 9.5, 10.0)).unwrap();
        let batch = acc.drain();
        assert_eq!(batch.len(), 1);
        assert!(batch.get(&aapl).is_none());
        assert_eq!(
            batch.get(&msft).unwrap().column(ASK_PRICE).unwrap().as_f32().unwrap(),
            &[10.0]
        );
        assert_eq!(acc.key_count(), 2);
    }

    #[test]
    fn drain_of_empty_accumulator_is_empty() {
        let acc = BatchAccumulator::new();
        assert!(acc.drain().is_empty());
    }

    #[test]
    fn trade_and_quote_keys_are_independent() {
        let acc = BatchAccumulator::new();
        acc.append(&TimeBucketKey::trade("AAPL"), trade(1, 10.0, 1)).unwrap();
        acc.append(&TimeBucketKey::quote("AAPL"), quote(1, 9.0, 10.0)).unwrap();

        assert_eq!(acc.key_count(), 2);
        assert_eq!(acc.pending_events(), 2);
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let acc = BatchAccumulator::new();
        let key = TimeBucketKey::trade("AAPL");
        acc.append(&key, trade(1, 10.0, 1)).unwrap();

        let err = acc.append(&key, quote(2, 9.0, 10.0)).unwrap_err();
        assert_eq!(
            err,
            AccumulatorError::KindMismatch {
                key: key.clone(),
                expected: EventKind::Trade,
                found: EventKind::Quote,
            }
        );
        assert_eq!(acc.buffer_len(&key), Some(1));

        acc.append(&key, trade(3, 11.0, 1)).unwrap();
        assert_eq!(acc.buffer_len(&key), Some(2));
    }
}
