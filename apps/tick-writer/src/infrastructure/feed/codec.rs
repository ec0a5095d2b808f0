//! Feed Decoder
//!
//! Stateless conversion from raw feed JSON into domain values.
//!
//! - A missing symbol is a decode fault: the element is reported and dropped.
//! - A trade with non-positive price or size is not a fault; it decodes to
//!   `Ok(None)` and is dropped silently.
//! - Fan-out over an array never lets one bad element abort its siblings.

use serde_json::Value;

use super::messages::{
    DepthMessage, EV_BOOK, EV_STATUS, EV_TRADE, StatusMessage, TradeMessage, event_type,
};
use crate::domain::events::{BookEntry, DepthUpdate, EventTime, Trade, TradeTick};

const SNIPPET_LEN: usize = 80;

/// Decoder errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The input was not valid JSON.
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// The element has no string symbol `S`.
    #[error("unexpected message (missing symbol): {0}")]
    MissingSymbol(String),

    /// Fan-out input was neither an array nor an object.
    #[error("expected JSON array, got: {0}")]
    NotAnArray(String),

    /// `t`/`T` do not fit in a nanosecond timestamp.
    #[error("timestamp out of range: t={millis} T={nanos}")]
    InvalidTimestamp {
        /// Millisecond component.
        millis: i64,
        /// Nanosecond component.
        nanos: i64,
    },

    /// The element was not a JSON object.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl DecodeError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::MissingSymbol(_) => "missing_symbol",
            Self::NotAnArray(_) => "not_an_array",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::InvalidFormat(_) => "invalid_format",
        }
    }
}

/// One element of a live feed frame, classified by `ev`.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    /// Trade element, still raw.
    Trade(Value),
    /// Book element, still raw.
    Depth(Value),
    /// Session control message.
    Status(StatusMessage),
    /// Anything else, with its `ev` value if present.
    Unknown(Option<String>),
}

/// Feed decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedDecoder;

impl FeedDecoder {
    /// Create a decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one trade object.
    ///
    /// Returns `Ok(None)` for trades without economic meaning.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not an object, has no symbol, or
    /// carries an out-of-range timestamp.
    pub fn decode_trade(&self, raw: &Value) -> Result<Option<TradeTick>, DecodeError> {
        if !raw.is_object() {
            return Err(DecodeError::InvalidFormat(snippet(raw)));
        }

        let msg = TradeMessage::from_value(raw);
        let Some(symbol) = msg.symbol else {
            return Err(DecodeError::MissingSymbol(snippet(raw)));
        };

        if msg.price <= 0.0 || msg.size <= 0 {
            return Ok(None);
        }

        let time = event_time(msg.millis, msg.nanos)?;
        let trade = Trade::new(time, narrow_price(msg.price), narrow_size(msg.size));
        if !trade.is_valid() {
            return Ok(None);
        }

        Ok(Some(TradeTick { symbol, trade }))
    }

    /// Decode every trade in an array (a lone object counts as one element).
    ///
    /// # Errors
    ///
    /// Returns an error only if `raw` is neither an array nor an object;
    /// per-element failures are returned in place.
    pub fn decode_trades(
        &self,
        raw: &Value,
    ) -> Result<Vec<Result<Option<TradeTick>, DecodeError>>, DecodeError> {
        Ok(elements(raw)?
            .iter()
            .map(|element| self.decode_trade(element))
            .collect())
    }

    /// Decode one book object.
    ///
    /// # Errors
    ///
    /// Returns an error if the element is not an object, has no symbol, or
    /// carries an out-of-range timestamp.
    pub fn decode_depth(&self, raw: &Value) -> Result<DepthUpdate, DecodeError> {
        if !raw.is_object() {
            return Err(DecodeError::InvalidFormat(snippet(raw)));
        }

        let msg = DepthMessage::from_value(raw);
        let Some(symbol) = msg.symbol else {
            return Err(DecodeError::MissingSymbol(snippet(raw)));
        };

        Ok(DepthUpdate {
            symbol,
            time: event_time(msg.millis, msg.nanos)?,
            bids: book_entries(&msg.bids),
            asks: book_entries(&msg.asks),
        })
    }

    /// Decode every book update in an array (a lone object counts as one element).
    ///
    /// # Errors
    ///
    /// Returns an error only if `raw` is neither an array nor an object.
    pub fn decode_depths(
        &self,
        raw: &Value,
    ) -> Result<Vec<Result<DepthUpdate, DecodeError>>, DecodeError> {
        Ok(elements(raw)?
            .iter()
            .map(|element| self.decode_depth(element))
            .collect())
    }

    /// Split a live frame into classified elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON, or is JSON but neither an
    /// array nor an object.
    pub fn split_frame(&self, text: &str) -> Result<Vec<FeedItem>, DecodeError> {
        let trimmed = text.trim();
        if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
            let head: String = trimmed.chars().take(SNIPPET_LEN).collect();
            return Err(DecodeError::InvalidFormat(head));
        }

        let value: Value = serde_json::from_str(trimmed)?;
        let items = match value {
            Value::Array(values) => values.into_iter().map(classify).collect(),
            other => vec![classify(other)],
        };
        Ok(items)
    }
}

fn classify(value: Value) -> FeedItem {
    match event_type(&value) {
        Some(EV_TRADE) => FeedItem::Trade(value),
        Some(EV_BOOK) => FeedItem::Depth(value),
        Some(EV_STATUS) => serde_json::from_value(value)
            .map_or_else(|_| FeedItem::Unknown(Some(EV_STATUS.to_string())), FeedItem::Status),
        other => FeedItem::Unknown(other.map(str::to_string)),
    }
}

fn elements(raw: &Value) -> Result<&[Value], DecodeError> {
    match raw {
        Value::Array(values) => Ok(values.as_slice()),
        Value::Object(_) => Ok(std::slice::from_ref(raw)),
        other => Err(DecodeError::NotAnArray(snippet(other))),
    }
}

fn event_time(millis: i64, nanos: i64) -> Result<EventTime, DecodeError> {
    EventTime::from_millis_nanos(millis, nanos).ok_or(DecodeError::InvalidTimestamp { millis, nanos })
}

#[allow(clippy::cast_possible_truncation)]
fn narrow_price(price: f64) -> f32 {
    price as f32
}

fn narrow_size(size: i64) -> i32 {
    i32::try_from(size).unwrap_or(if size > 0 { i32::MAX } else { i32::MIN })
}

fn book_entries(levels: &[(f64, i64)]) -> Vec<BookEntry> {
    levels
        .iter()
        .map(|&(price, size)| BookEntry::new(narrow_price(price), narrow_size(size)))
        .collect()
}

fn snippet(value: &Value) -> String {
    value.to_string().chars().take(SNIPPET_LEN).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test]
    fn decodes_trade() {
        let tick = FeedDecoder::new()
            .decode_trade(&json!({"S": "AAPL", "p": 150.25, "s": 10, "t": 1_700_000_000_000_i64, "T": 500_000}))
            .unwrap()
            .unwrap();

        assert_eq!(tick.symbol, "AAPL");
        assert_eq!(tick.trade.epoch, 1_700_000_000);
        assert_eq!(tick.trade.nanos, 500_000);
        assert_eq!(tick.trade.price, 150.25);
        assert_eq!(tick.trade.size, 10);
    }

    #[test_case(json!({"S": "AAPL", "p": 0.0, "s": 10}) ; "zero price")]
    #[test_case(json!({"S": "AAPL", "p": -1.0, "s": 10}) ; "negative price")]
    #[test_case(json!({"S": "AAPL", "p": 10.0, "s": 0}) ; "zero size")]
    #[test_case(json!({"S": "AAPL", "s": 10}) ; "missing price")]
    #[test_case(json!({"S": "AAPL", "p": 1e-60, "s": 10}) ; "price underflows f32")]
    #[test_case(json!({"S": "AAPL", "p": 1e300, "s": 10}) ; "price overflows f32")]
    fn economically_invalid_trade_is_silently_dropped(raw: Value) {
        assert!(FeedDecoder::new().decode_trade(&raw).unwrap().is_none());
    }

    #[test]
    fn missing_symbol_is_an_error() {
        let err = FeedDecoder::new()
            .decode_trade(&json!({"p": 1.0, "s": 1}))
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingSymbol(_)));
        assert_eq!(err.kind(), "missing_symbol");
    }

    #[test]
    fn timestamp_overflow_is_an_error() {
        let err = FeedDecoder::new()
            .decode_trade(&json!({"S": "X", "p": 1.0, "s": 1, "t": i64::MAX}))
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTimestamp { .. }));
    }

    #[test]
    fn oversized_size_saturates() {
        let tick = FeedDecoder::new()
            .decode_trade(&json!({"S": "X", "p": 1.0, "s": 10_000_000_000_i64}))
            .unwrap()
            .unwrap();
        assert_eq!(tick.trade.size, i32::MAX);
    }

    #[test]
    fn trade_fan_out_isolates_failures() {
        let results = FeedDecoder::new()
            .decode_trades(&json!([
                {"S": "AAPL", "p": 1.0, "s": 1},
                {"p": 1.0, "s": 1},
                {"S": "MSFT", "p": 0.0, "s": 1},
                {"S": "SPY", "p": 2.0, "s": 2}
            ]))
            .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap().as_ref().unwrap().symbol, "AAPL");
        assert!(results[1].is_err());
        assert!(results[2].as_ref().unwrap().is_none());
        assert_eq!(results[3].as_ref().unwrap().as_ref().unwrap().symbol, "SPY");
    }

    #[test]
    fn fan_out_accepts_single_object() {
        let results = FeedDecoder::new()
            .decode_trades(&json!({"S": "AAPL", "p": 1.0, "s": 1}))
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn fan_out_rejects_scalars() {
        let err = FeedDecoder::new().decode_depths(&json!(42)).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnArray(_)));
    }

    #[test]
    fn decodes_depth() {
        let update = FeedDecoder::new()
            .decode_depth(&json!({
                "S": "MSFT",
                "t": 1_700_000_000_000_i64,
                "T": 0,
                "b": [[300.0, 5], [299.0, 3]],
                "a": [[300.5, 7]]
            }))
            .unwrap();

        assert_eq!(update.symbol, "MSFT");
        assert_eq!(update.time.epoch, 1_700_000_000);
        assert_eq!(update.bids, vec![BookEntry::new(300.0, 5), BookEntry::new(299.0, 3)]);
        assert_eq!(update.asks, vec![BookEntry::new(300.5, 7)]);
    }

    #[test]
    fn depth_without_sides_is_empty() {
        let update = FeedDecoder::new().decode_depth(&json!({"S": "IBM"})).unwrap();
        assert!(update.bids.is_empty());
        assert!(update.asks.is_empty());
    }

    #[test]
    fn split_frame_classifies_elements() {
        let items = FeedDecoder::new()
            .split_frame(r#"[
                {"ev":"status","status":"connected","message":"hello"},
                {"ev":"T","S":"AAPL","p":1.0,"s":1},
                {"ev":"B","S":"MSFT","b":[],"a":[]},
                {"ev":"Q","S":"AAPL"},
                {"S":"X"}
            ]"#)
            .unwrap();

        assert!(matches!(&items[0], FeedItem::Status(s) if s.status == "connected"));
        assert!(matches!(items[1], FeedItem::Trade(_)));
        assert!(matches!(items[2], FeedItem::Depth(_)));
        assert_eq!(items[3], FeedItem::Unknown(Some("Q".to_string())));
        assert_eq!(items[4], FeedItem::Unknown(None));
    }

    #[test]
    fn split_frame_accepts_single_object() {
        let items = FeedDecoder::new()
            .split_frame(r#"{"ev":"T","S":"AAPL"}"#)
            .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn split_frame_rejects_garbage() {
        assert!(matches!(
            FeedDecoder::new().split_frame("hello"),
            Err(DecodeError::InvalidFormat(_))
        ));
        assert!(matches!(
            FeedDecoder::new().split_frame("[{"),
            Err(DecodeError::Json(_))
        ));
    }
}
