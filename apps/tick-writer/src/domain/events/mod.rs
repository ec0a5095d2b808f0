//! Market Event Types
//!
//! Typed domain events produced from the feed and consumed by the
//! batching writer, plus the time-bucket key that names their
//! destination stream.
//!
//! # Streams
//!
//! - Trades: `<symbol>/<timeframe>/TRADE`
//! - Synthesized quotes: `<symbol>/<timeframe>/QUOTE`

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Default sampling interval component of derived stream keys.
pub const DEFAULT_TIMEFRAME: &str = "1Min";

const NANOS_PER_MILLI: i64 = 1_000_000;

// =============================================================================
// Time Bucket Key
// =============================================================================

/// Record kind component of a [`TimeBucketKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    /// Trade prints.
    #[serde(rename = "TRADE")]
    Trade,
    /// Synthesized BBO quotes.
    #[serde(rename = "QUOTE")]
    Quote,
}

impl RecordKind {
    /// Get the stream name component.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "TRADE",
            Self::Quote => "QUOTE",
        }
    }

    /// The event kind carried by streams of this record kind.
    #[must_use]
    pub const fn event_kind(self) -> EventKind {
        match self {
            Self::Trade => EventKind::Trade,
            Self::Quote => EventKind::Quote,
        }
    }
}

/// Identifies a destination stream: symbol, sampling interval and record kind.
///
/// Rendered as `"AAPL/1Min/TRADE"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeBucketKey {
    symbol: String,
    timeframe: String,
    record: RecordKind,
}

impl TimeBucketKey {
    /// Create a key from its components.
    #[must_use]
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>, record: RecordKind) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            record,
        }
    }

    /// Trade stream key using the default timeframe.
    #[must_use]
    pub fn trade(symbol: impl Into<String>) -> Self {
        Self::new(symbol, DEFAULT_TIMEFRAME, RecordKind::Trade)
    }

    /// Quote stream key using the default timeframe.
    #[must_use]
    pub fn quote(symbol: impl Into<String>) -> Self {
        Self::new(symbol, DEFAULT_TIMEFRAME, RecordKind::Quote)
    }

    /// Get the symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the timeframe.
    #[must_use]
    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    /// Get the record kind.
    #[must_use]
    pub const fn record(&self) -> RecordKind {
        self.record
    }
}

impl fmt::Display for TimeBucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.symbol, self.timeframe, self.record.as_str())
    }
}

impl Serialize for TimeBucketKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Error parsing a [`TimeBucketKey`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time bucket key: {0}")]
pub struct ParseKeyError(String);

impl FromStr for TimeBucketKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (Some(symbol), Some(timeframe), Some(record), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseKeyError(s.to_string()));
        };

        if symbol.is_empty() || timeframe.is_empty() {
            return Err(ParseKeyError(s.to_string()));
        }

        let record = match record {
            "TRADE" => RecordKind::Trade,
            "QUOTE" => RecordKind::Quote,
            _ => return Err(ParseKeyError(s.to_string())),
        };

        Ok(Self::new(symbol, timeframe, record))
    }
}

// =============================================================================
// Event Time
// =============================================================================

/// Wall-clock instant split into epoch seconds and a nanosecond remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct EventTime {
    /// Seconds since the Unix epoch.
    pub epoch: i64,
    /// Nanoseconds within the second (0..=999,999,999).
    pub nanos: i32,
}

impl EventTime {
    /// Combine a millisecond timestamp and a nanosecond remainder.
    ///
    /// Returns `None` if the combined nanosecond count overflows.
    #[must_use]
    pub fn from_millis_nanos(millis: i64, nanos: i64) -> Option<Self> {
        let total = millis.checked_mul(NANOS_PER_MILLI)?.checked_add(nanos)?;
        let ts = DateTime::from_timestamp_nanos(total);
        let nanos = i32::try_from(ts.timestamp_subsec_nanos()).ok()?;
        Some(Self {
            epoch: ts.timestamp(),
            nanos,
        })
    }
}

// =============================================================================
// Events
// =============================================================================

/// A single trade print.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trade {
    /// Seconds since the Unix epoch.
    pub epoch: i64,
    /// Nanoseconds within the second.
    pub nanos: i32,
    /// Trade price.
    pub price: f32,
    /// Trade size.
    pub size: i32,
}

impl Trade {
    /// Create a trade stamped with `time`.
    #[must_use]
    pub const fn new(time: EventTime, price: f32, size: i32) -> Self {
        Self {
            epoch: time.epoch,
            nanos: time.nanos,
            price,
            size,
        }
    }

    /// Whether the trade carries economic meaning (finite positive price,
    /// positive size).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.size > 0
    }
}

/// A BBO snapshot at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuoteUpdate {
    /// Seconds since the Unix epoch.
    pub epoch: i64,
    /// Nanoseconds within the second.
    pub nanos: i32,
    /// Best bid price.
    pub bid_price: f32,
    /// Best ask price.
    pub ask_price: f32,
    /// Size at the best bid.
    pub bid_size: i32,
    /// Size at the best ask.
    pub ask_size: i32,
}

impl QuoteUpdate {
    /// Create a quote from a BBO snapshot stamped with `time`.
    #[must_use]
    pub const fn from_bbo(time: EventTime, bbo: Bbo) -> Self {
        Self {
            epoch: time.epoch,
            nanos: time.nanos,
            bid_price: bbo.bid.price,
            ask_price: bbo.ask.price,
            bid_size: bbo.bid.size,
            ask_size: bbo.ask.size,
        }
    }
}

/// Discriminant of a [`MarketEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Trade print.
    Trade,
    /// BBO quote.
    Quote,
}

impl EventKind {
    /// Get the kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Quote => "quote",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any event the writer accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarketEvent {
    /// Trade print.
    Trade(Trade),
    /// BBO quote.
    Quote(QuoteUpdate),
}

impl MarketEvent {
    /// Get the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Trade(_) => EventKind::Trade,
            Self::Quote(_) => EventKind::Quote,
        }
    }
}

impl From<Trade> for MarketEvent {
    fn from(trade: Trade) -> Self {
        Self::Trade(trade)
    }
}

impl From<QuoteUpdate> for MarketEvent {
    fn from(quote: QuoteUpdate) -> Self {
        Self::Quote(quote)
    }
}

/// A keyed event queued for the batching writer.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePacket {
    /// Destination stream.
    pub key: TimeBucketKey,
    /// The event.
    pub event: MarketEvent,
}

impl WritePacket {
    /// Create a packet.
    #[must_use]
    pub const fn new(key: TimeBucketKey, event: MarketEvent) -> Self {
        Self { key, event }
    }
}

// =============================================================================
// Book Levels
// =============================================================================

/// One price level on one side of a book.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BookEntry {
    /// Level price.
    pub price: f32,
    /// Level size.
    pub size: i32,
}

impl BookEntry {
    /// Create an entry.
    #[must_use]
    pub const fn new(price: f32, size: i32) -> Self {
        Self { price, size }
    }
}

/// Best bid and offer. An empty side is reported as a zero entry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bbo {
    /// Highest bid.
    pub bid: BookEntry,
    /// Lowest ask.
    pub ask: BookEntry,
}

// =============================================================================
// Decoded Feed Values
// =============================================================================

/// A validated trade for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTick {
    /// Ticker symbol.
    pub symbol: String,
    /// The trade.
    pub trade: Trade,
}

/// One depth-update message: levels to apply, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DepthUpdate {
    /// Ticker symbol.
    pub symbol: String,
    /// Update timestamp.
    pub time: EventTime,
    /// Bid levels.
    pub bids: Vec<BookEntry>,
    /// Ask levels.
    pub asks: Vec<BookEntry>,
}

// =============================================================================
// Tests
// =============================================================================
