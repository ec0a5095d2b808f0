//! Domain Layer - Core market data types.
//!
//! Events, time-bucket keys, column-major batches and the default
//! price-level order book.

/// Market events and stream keys.
pub mod events;

/// Column-major batches handed to the storage sink.
pub mod columns;

/// Default price-level order-book engine.
pub mod order_book;
