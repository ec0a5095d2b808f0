//! Order Book Gateway
//!
//! Registry of per-symbol order books. The registry lock only guards
//! lookup and creation; book updates and BBO reads go through the book's
//! own synchronization.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::ports::OrderBook;
use crate::domain::events::{Bbo, BookEntry};
use crate::domain::order_book::LevelBook;

/// Shared handle to one symbol's book.
pub type OrderBookHandle = Arc<dyn OrderBook>;

/// Builds a new book the first time a symbol is seen.
pub type BookFactory = Box<dyn Fn(&str) -> OrderBookHandle + Send + Sync>;

/// Per-symbol order-book registry.
pub struct OrderBookGateway {
    books: Mutex<HashMap<String, OrderBookHandle>>,
    factory: BookFactory,
}

impl fmt::Debug for OrderBookGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBookGateway")
            .field("symbols", &self.symbol_count())
            .finish_non_exhaustive()
    }
}

impl Default for OrderBookGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookGateway {
    /// Create a gateway backed by [`LevelBook`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_factory(Box::new(|_| Arc::new(LevelBook::new())))
    }

    /// Create a gateway with a custom book engine.
    #[must_use]
    pub fn with_factory(factory: BookFactory) -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Get the book for `symbol`, creating it if this is the first sighting.
    ///
    /// Concurrent callers for the same symbol always receive the same book.
    pub fn get_or_create(&self, symbol: &str) -> OrderBookHandle {
        let mut books = self.books.lock();
        if let Some(book) = books.get(symbol) {
            return Arc::clone(book);
        }

        let book = (self.factory)(symbol);
        books.insert(symbol.to_string(), Arc::clone(&book));
        drop(books);
        tracing::debug!(symbol, "Created order book");
        book
    }

    /// Apply one bid level.
    pub fn apply_bid(&self, book: &OrderBookHandle, entry: BookEntry) {
        book.bid(entry);
    }

    /// Apply one ask level.
    pub fn apply_ask(&self, book: &OrderBookHandle, entry: BookEntry) {
        book.ask(entry);
    }

    /// Current BBO of `book`.
    #[must_use]
    pub fn bbo(&self, book: &OrderBookHandle) -> Bbo {
        book.bbo()
    }

    /// Number of symbols with a book.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.books.lock().len()
    }
}
