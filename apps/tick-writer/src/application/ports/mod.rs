//! Port Interfaces
//!
//! Contracts for the collaborators the core depends on but does not own.
//!
//! ## Driven Ports (Outbound)
//!
//! - `OrderBook`: per-symbol book engine (update and BBO query), defined
//!   alongside its default engine in `domain::order_book`
//! - `StorageSink`: receives finished column batches

use async_trait::async_trait;

use crate::domain::columns::ColumnSeriesMap;
pub use crate::domain::order_book::OrderBook;

/// Storage sink errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink could not persist the batch.
    #[error("sink write failed: {0}")]
    WriteFailed(String),

    /// I/O failure writing the batch.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The batch could not be encoded.
    #[error("sink encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for flushed column batches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Persist every stream in `batch`.
    async fn write(&self, batch: &ColumnSeriesMap) -> Result<(), SinkError>;
}
