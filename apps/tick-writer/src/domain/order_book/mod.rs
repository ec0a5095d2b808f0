//! Price-Level Order Book
//!
//! Default order-book engine used by the gateway. Each side is a map from
//! price to aggregate size; an update replaces the size at its price and a
//! non-positive size removes the level.
//!
//! Bids and asks share one lock, so a reader never observes a half-applied
//! update to a single side.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use parking_lot::Mutex;

use super::events::{Bbo, BookEntry};

/// Per-symbol order-book engine.
///
/// Implementations must be safe to update and query from multiple threads;
/// the gateway only serializes creation, not book access.
pub trait OrderBook: Send + Sync {
    /// Apply one bid level.
    fn bid(&self, entry: BookEntry);

    /// Apply one ask level.
    fn ask(&self, entry: BookEntry);

    /// Current best bid and offer.
    fn bbo(&self) -> Bbo;
}

type Levels = BTreeMap<OrderedFloat<f32>, i32>;

#[derive(Debug, Default)]
struct Sides {
    bids: Levels,
    asks: Levels,
}

/// Price-ordered book for a single symbol.
#[derive(Debug, Default)]
pub struct LevelBook {
    sides: Mutex<Sides>,
}

impl LevelBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bid levels.
    #[must_use]
    pub fn bid_levels(&self) -> usize {
        self.sides.lock().bids.len()
    }

    /// Number of ask levels.
    #[must_use]
    pub fn ask_levels(&self) -> usize {
        self.sides.lock().asks.len()
    }

    fn apply(levels: &mut Levels, entry: BookEntry) {
        if !entry.price.is_finite() || entry.price <= 0.0 {
            return;
        }

        let price = OrderedFloat(entry.price);
        if entry.size > 0 {
            levels.insert(price, entry.size);
        } else {
            levels.remove(&price);
        }
    }
}

impl OrderBook for LevelBook {
    fn bid(&self, entry: BookEntry) {
        Self::apply(&mut self.sides.lock().bids, entry);
    }

    fn ask(&self, entry: BookEntry) {
        Self::apply(&mut self.sides.lock().asks, entry);
    }

    fn bbo(&self) -> Bbo {
        let sides = self.sides.lock();
        let bid = sides
            .bids
            .last_key_value()
            .map(|(p, s)| BookEntry::new(p.0, *s))
            .unwrap_or_default();
        let ask = sides
            .asks
            .first_key_value()
            .map(|(p, s)| BookEntry::new(p.0, *s))
            .unwrap_or_default();
        Bbo { bid, ask }
    }
}
