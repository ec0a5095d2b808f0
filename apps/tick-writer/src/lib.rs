#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Tick Writer - Market Data Micro-Batching Writer
//!
//! Ingests trade prints and order-book depth updates, keeps a per-symbol
//! best bid/offer, and flushes column-major batches to a storage sink on a
//! fixed cadence.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: events, stream keys, column batches, price-level book
//! - **Application**: ports (`OrderBook`, `StorageSink`) and services
//!   (gateway, synthesizer, accumulator, queue, writer, pipeline)
//! - **Infrastructure**: feed client and replay, decoding, sinks, config,
//!   metrics, telemetry, health endpoint
//!
//! # Data Flow
//!
//! ```text
//! Feed WS / replay ──► FeedHandler ──► FeedDecoder
//!                                          │
//!                  trade ◄─────────────────┴──────────► depth
//!                    │                                    │
//!                    │                 OrderBookGateway ──┤
//!                    │                 QuoteSynthesizer ◄─┘
//!                    ▼                        │
//!               BatchingWriter::submit ◄──────┘
//!                    │
//!              InboundQueue ──► consumer task ──► BatchAccumulator
//!                                    │ tick
//!                                    ▼
//!                          ColumnSeriesMap ──► StorageSink
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::columns::{Column, ColumnSeries, ColumnSeriesMap};
pub use domain::order_book::LevelBook;
pub use domain::events::{
    Bbo, BookEntry, DepthUpdate, EventKind, EventTime, MarketEvent, QuoteUpdate, RecordKind,
    TimeBucketKey, Trade, TradeTick, WritePacket,
};

// Ports
pub use application::ports::{OrderBook, SinkError, StorageSink};

// Services
pub use application::services::{
    BatchingWriter, IngestPipeline, OverflowPolicy, PipelineConfig, QueueConfig, QuoteEmitMode,
    SinkFailurePolicy, WriterConfig,
};

// Infrastructure
pub use infrastructure::config::{ConfigError, TickWriterConfig};
pub use infrastructure::feed::{FeedDecoder, FeedHandler};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::sink::{JsonLinesSink, LoggingSink, MemorySink};
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
