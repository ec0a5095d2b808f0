//! Feed Wire Messages
//!
//! Wire-level shapes of the market data feed. Live frames are JSON arrays;
//! each element carries an `ev` discriminator:
//!
//! | `ev`       | Meaning                 |
//! |------------|-------------------------|
//! | `T`        | Trade print             |
//! | `B`        | Book (depth) update     |
//! | `status`   | Session control message |
//!
//! Data fields are read leniently: a missing or mistyped numeric field reads
//! as zero. Only the symbol `S` is mandatory.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator for trade elements.
pub const EV_TRADE: &str = "T";
/// Discriminator for book elements.
pub const EV_BOOK: &str = "B";
/// Discriminator for control elements.
pub const EV_STATUS: &str = "status";

/// Default subscription: all trades and all books.
pub const DEFAULT_CHANNELS: &str = "T.*,B.*";

// =============================================================================
// Outbound Control Messages
// =============================================================================

/// Client-to-server session message.
///
/// ```json
/// {"action":"auth","params":"<key>"}
/// {"action":"subscribe","params":"T.*,B.*"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Action name.
    pub action: String,
    /// Action parameter.
    pub params: String,
}

impl ControlRequest {
    /// Authentication request.
    #[must_use]
    pub fn auth(key: impl Into<String>) -> Self {
        Self {
            action: "auth".to_string(),
            params: key.into(),
        }
    }

    /// Subscription request for a comma-separated channel list.
    #[must_use]
    pub fn subscribe(channels: impl Into<String>) -> Self {
        Self {
            action: "subscribe".to_string(),
            params: channels.into(),
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound Control Messages
// =============================================================================

/// Server status element.
///
/// ```json
/// {"ev":"status","status":"auth_success","message":"authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusMessage {
    /// Status code (`connected`, `auth_success`, `auth_failed`, `success`, ...).
    #[serde(default)]
    pub status: String,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

impl StatusMessage {
    /// Whether this status ends the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.status.as_str(), "auth_failed" | "auth_timeout" | "error")
    }
}

// =============================================================================
// Inbound Data Messages
// =============================================================================

/// Trade element.
///
/// ```json
/// {"ev":"T","S":"AAPL","p":150.25,"s":10,"t":1700000000000,"T":500000}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TradeMessage {
    /// Symbol (`S`); `None` if absent or not a string.
    pub symbol: Option<String>,
    /// Price (`p`).
    pub price: f64,
    /// Size (`s`).
    pub size: i64,
    /// Millisecond timestamp (`t`).
    pub millis: i64,
    /// Nanosecond remainder (`T`).
    pub nanos: i64,
}

impl TradeMessage {
    /// Read the trade fields from a JSON object.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self {
            symbol: symbol_of(value),
            price: float_field(value, "p"),
            size: int_field(value, "s"),
            millis: int_field(value, "t"),
            nanos: int_field(value, "T"),
        }
    }
}

/// Book element.
///
/// ```json
/// {"ev":"B","S":"MSFT","t":1700000000000,"T":0,"b":[[300.0,5]],"a":[[300.5,7]]}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMessage {
    /// Symbol (`S`); `None` if absent or not a string.
    pub symbol: Option<String>,
    /// Millisecond timestamp (`t`).
    pub millis: i64,
    /// Nanosecond remainder (`T`).
    pub nanos: i64,
    /// Bid `[price, size]` pairs (`b`), in source order.
    pub bids: Vec<(f64, i64)>,
    /// Ask `[price, size]` pairs (`a`), in source order.
    pub asks: Vec<(f64, i64)>,
}

impl DepthMessage {
    /// Read the depth fields from a JSON object.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self {
            symbol: symbol_of(value),
            millis: int_field(value, "t"),
            nanos: int_field(value, "T"),
            bids: levels(value.get("b")),
            asks: levels(value.get("a")),
        }
    }
}

/// The element's `ev` discriminator, if any.
#[must_use]
pub fn event_type(value: &Value) -> Option<&str> {
    value.get("ev").and_then(Value::as_str)
}

fn symbol_of(value: &Value) -> Option<String> {
    value
        .get("S")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn float_field(value: &Value, name: &str) -> f64 {
    value.get(name).and_then(Value::as_f64).unwrap_or_default()
}

fn int_field(value: &Value, name: &str) -> i64 {
    value.get(name).and_then(Value::as_i64).unwrap_or_default()
}

fn levels(side: Option<&Value>) -> Vec<(f64, i64)> {
    side.and_then(Value::as_array)
        .map(|pairs| {
            pairs
                .iter()
                .map(|pair| {
                    let price = pair.get(0).and_then(Value::as_f64).unwrap_or_default();
                    let size = pair.get(1).and_then(Value::as_i64).unwrap_or_default();
                    (price, size)
                })
                .collect()
        })
        .unwrap_or_default()
}
