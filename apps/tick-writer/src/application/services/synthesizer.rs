//! Quote Synthesizer
//!
//! Turns a depth update into a BBO quote: apply every bid, then every ask,
//! then read the book's best levels once.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::gateway::OrderBookGateway;
use crate::domain::events::{Bbo, DepthUpdate, QuoteUpdate};

/// When a depth update produces a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteEmitMode {
    /// One quote per depth update.
    #[default]
    Always,
    /// Only when the BBO differs from the last quote for the symbol.
    OnChange,
}

impl QuoteEmitMode {
    /// Parse a mode name (`always`, `on-change`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "always" => Some(Self::Always),
            "on-change" | "onchange" => Some(Self::OnChange),
            _ => None,
        }
    }
}

/// Depth update to quote converter.
#[derive(Debug, Default)]
pub struct QuoteSynthesizer {
    mode: QuoteEmitMode,
    last: Mutex<HashMap<String, Bbo>>,
}

impl QuoteSynthesizer {
    /// Create a synthesizer.
    #[must_use]
    pub fn new(mode: QuoteEmitMode) -> Self {
        Self {
            mode,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Emission mode.
    #[must_use]
    pub const fn mode(&self) -> QuoteEmitMode {
        self.mode
    }

    /// Apply `update` to its symbol's book and build the resulting quote.
    ///
    /// Returns `None` only in [`QuoteEmitMode::OnChange`] when the BBO is
    /// unchanged since the previous quote for this symbol.
    pub fn synthesize(&self, gateway: &OrderBookGateway, update: &DepthUpdate) -> Option<QuoteUpdate> {
        let book = gateway.get_or_create(&update.symbol);
        for &entry in &update.bids {
            gateway.apply_bid(&book, entry);
        }
        for &entry in &update.asks {
            gateway.apply_ask(&book, entry);
        }

        let bbo = gateway.bbo(&book);
        tracing::debug!(
            symbol = %update.symbol,
            bid_price = bbo.bid.price,
            bid_size = bbo.bid.size,
            ask_price = bbo.ask.price,
            ask_size = bbo.ask.size,
            "BBO"
        );

        if self.mode == QuoteEmitMode::OnChange {
            let mut last = self.last.lock();
            if last.get(&update.symbol) == Some(&bbo) {
                return None;
            }
            last.insert(update.symbol.clone(), bbo);
        }

        Some(QuoteUpdate::from_bbo(update.time, bbo))
    }
}
