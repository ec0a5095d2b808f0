//! Application Services
//!
//! - `IngestPipeline`: wires the services below for one feed
//! - `OrderBookGateway`: per-symbol order-book registry
//! - `QuoteSynthesizer`: depth update to BBO quote
//! - `BatchAccumulator`: per-key open buffers
//! - `InboundQueue`: writer's inbound FIFO
//! - `BatchingWriter`: consumer task with periodic flush

pub mod accumulator;
pub mod gateway;
pub mod pipeline;
pub mod queue;
pub mod synthesizer;
pub mod writer;

pub use accumulator::{AccumulatorError, BatchAccumulator};
pub use gateway::{BookFactory, OrderBookGateway, OrderBookHandle};
pub use pipeline::{IngestPipeline, PipelineConfig};
pub use queue::{InboundQueue, OverflowPolicy, PushOutcome, QueueConfig};
pub use synthesizer::{QuoteEmitMode, QuoteSynthesizer};
pub use writer::{
    BatchingWriter, DEFAULT_FLUSH_INTERVAL, DEFAULT_SINK_MAX_ATTEMPTS, SinkFailurePolicy,
    SubmitOutcome, WriterConfig, WriterStats, WriterStatsSnapshot,
};
