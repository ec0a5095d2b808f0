//! Column-Major Batches
//!
//! Parallel, equal-length arrays produced by transposing an open buffer at
//! flush time, grouped per destination stream.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Serialize, Serializer, ser::SerializeMap};

use super::events::{QuoteUpdate, TimeBucketKey, Trade};

/// Seconds since the Unix epoch.
pub const EPOCH: &str = "Epoch";
/// Nanosecond remainder.
pub const NANOSECONDS: &str = "Nanoseconds";
/// Trade price.
pub const PRICE: &str = "Price";
/// Trade size.
pub const SIZE: &str = "Size";
/// Best bid price.
pub const BID_PRICE: &str = "BidPrice";
/// Best ask price.
pub const ASK_PRICE: &str = "AskPrice";
/// Best bid size.
pub const BID_SIZE: &str = "BidSize";
/// Best ask size.
pub const ASK_SIZE: &str = "AskSize";

// =============================================================================
// Column
// =============================================================================

/// A single typed column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Column {
    /// 64-bit signed integers.
    Int64(Vec<i64>),
    /// 32-bit signed integers.
    Int32(Vec<i32>),
    /// 32-bit floats.
    Float32(Vec<f32>),
}

impl Column {
    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int64(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Float32(v) => v.len(),
        }
    }

    /// Whether the column has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as `i64` values.
    #[must_use]
    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            Self::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow as `i32` values.
    #[must_use]
    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            Self::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow as `f32` values.
    #[must_use]
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::Float32(v) => Some(v),
            _ => None,
        }
    }

    /// Append the values of `other`. Returns `false` on a type mismatch.
    fn extend(&mut self, other: Self) -> bool {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.extend(b),
            (Self::Int32(a), Self::Int32(b)) => a.extend(b),
            (Self::Float32(a), Self::Float32(b)) => a.extend(b),
            _ => return false,
        }
        true
    }
}

// =============================================================================
// Column Series
// =============================================================================

/// Ordered set of named, equal-length columns for one stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnSeries {
    columns: Vec<(&'static str, Column)>,
}

impl ColumnSeries {
    /// Create an empty series.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Add (or replace) a named column.
    pub fn add_column(&mut self, name: &'static str, column: Column) {
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = column;
        } else {
            self.columns.push((name, column));
        }
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find_map(|(n, c)| (*n == name).then_some(c))
    }

    /// Column names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(n, _)| *n)
    }

    /// Number of rows (length of the first column).
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    /// Whether the series has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transpose trades into `Epoch, Nanoseconds, Price, Size`.
    #[must_use]
    pub fn from_trades(trades: &[Trade]) -> Self {
        let mut series = Self::new();
        series.add_column(EPOCH, Column::Int64(trades.iter().map(|t| t.epoch).collect()));
        series.add_column(
            NANOSECONDS,
            Column::Int32(trades.iter().map(|t| t.nanos).collect()),
        );
        series.add_column(PRICE, Column::Float32(trades.iter().map(|t| t.price).collect()));
        series.add_column(SIZE, Column::Int32(trades.iter().map(|t| t.size).collect()));
        series
    }

    /// Transpose quotes into `Epoch, Nanoseconds, BidPrice, AskPrice, BidSize, AskSize`.
    #[must_use]
    pub fn from_quotes(quotes: &[QuoteUpdate]) -> Self {
        let mut series = Self::new();
        series.add_column(EPOCH, Column::Int64(quotes.iter().map(|q| q.epoch).collect()));
        series.add_column(
            NANOSECONDS,
            Column::Int32(quotes.iter().map(|q| q.nanos).collect()),
        );
        series.add_column(
            BID_PRICE,
            Column::Float32(quotes.iter().map(|q| q.bid_price).collect()),
        );
        series.add_column(
            ASK_PRICE,
            Column::Float32(quotes.iter().map(|q| q.ask_price).collect()),
        );
        series.add_column(
            BID_SIZE,
            Column::Int32(quotes.iter().map(|q| q.bid_size).collect()),
        );
        series.add_column(
            ASK_SIZE,
            Column::Int32(quotes.iter().map(|q| q.ask_size).collect()),
        );
        series
    }

    /// Append the rows of `other` after this series' rows.
    ///
    /// Columns missing from either side or of a different type are left
    /// untouched; a single stream only ever carries one shape.
    pub fn append(&mut self, other: Self) {
        for (name, column) in other.columns {
            match self.columns.iter_mut().find(|(n, _)| *n == name) {
                Some((_, existing)) => {
                    if !existing.extend(column) {
                        tracing::warn!(column = name, "Column type mismatch while merging batches");
                    }
                }
                None => self.columns.push((name, column)),
            }
        }
    }
}

impl Serialize for ColumnSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, column) in &self.columns {
            map.serialize_entry(name, column)?;
        }
        map.end()
    }
}

// =============================================================================
// Column Series Map
// =============================================================================

/// Column batches for every stream touched by one flush, ordered by key.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ColumnSeriesMap {
    series: BTreeMap<TimeBucketKey, ColumnSeries>,
}

impl ColumnSeriesMap {
    /// Create an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            series: BTreeMap::new(),
        }
    }

    /// Insert a series for `key`, appending if the key is already present.
    pub fn insert(&mut self, key: TimeBucketKey, series: ColumnSeries) {
        match self.series.entry(key) {
            btree_map::Entry::Occupied(mut e) => e.get_mut().append(series),
            btree_map::Entry::Vacant(e) => {
                e.insert(series);
            }
        }
    }

    /// Look up the series for `key`.
    #[must_use]
    pub fn get(&self, key: &TimeBucketKey) -> Option<&ColumnSeries> {
        self.series.get(key)
    }

    /// Iterate streams in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&TimeBucketKey, &ColumnSeries)> {
        self.series.iter()
    }

    /// Number of streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether no stream has rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.values().all(ColumnSeries::is_empty)
    }

    /// Total rows across all streams.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.series.values().map(ColumnSeries::len).sum()
    }

    /// Append `later` after this map's rows, stream by stream.
    pub fn merge(&mut self, later: Self) {
        for (key, series) in later.series {
            self.insert(key, series);
        }
    }
}

impl IntoIterator for ColumnSeriesMap {
    type Item = (TimeBucketKey, ColumnSeries);
    type IntoIter = btree_map::IntoIter<TimeBucketKey, ColumnSeries>;

    fn into_iter(self) -> Self::IntoIter {
        self.series.into_iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
