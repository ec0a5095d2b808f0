//! Ingest Pipeline
//!
//! Context object owning one order-book gateway, one quote synthesizer and
//! one batching writer. Nothing here is process-global, so independent
//! pipelines can run side by side.

use std::sync::Arc;

use super::gateway::OrderBookGateway;
use super::synthesizer::{QuoteEmitMode, QuoteSynthesizer};
use super::writer::{BatchingWriter, SubmitOutcome, WriterConfig, WriterStatsSnapshot};
use crate::application::ports::StorageSink;
use crate::domain::events::{
    DEFAULT_TIMEFRAME, DepthUpdate, RecordKind, TimeBucketKey, TradeTick, WritePacket,
};
use crate::infrastructure::metrics::{self, DropReason};

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Timeframe component of every stream key.
    pub timeframe: String,
    /// Quote emission mode.
    pub quote_emit: QuoteEmitMode,
    /// Writer configuration.
    pub writer: WriterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeframe: DEFAULT_TIMEFRAME.to_string(),
            quote_emit: QuoteEmitMode::default(),
            writer: WriterConfig::default(),
        }
    }
}

/// Decoded events in, keyed write packets out.
#[derive(Debug)]
pub struct IngestPipeline {
    timeframe: String,
    gateway: OrderBookGateway,
    synthesizer: QuoteSynthesizer,
    writer: BatchingWriter,
}

impl IngestPipeline {
    /// Build the pipeline and start its writer.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(config: PipelineConfig, sink: Arc<dyn StorageSink>) -> Self {
        Self {
            gateway: OrderBookGateway::new(),
            synthesizer: QuoteSynthesizer::new(config.quote_emit),
            writer: BatchingWriter::start(config.writer, sink),
            timeframe: config.timeframe,
        }
    }

    /// Submit a trade to `<symbol>/<timeframe>/TRADE`.
    ///
    /// Returns `None` if the trade has a non-positive price or size. Under a
    /// bounded `Block` queue this parks the calling thread; async callers
    /// use [`submit_trade`](Self::submit_trade).
    pub fn on_trade(&self, tick: TradeTick) -> Option<SubmitOutcome> {
        self.trade_packet(tick).map(|packet| self.writer.submit(packet))
    }

    /// Apply a depth update and submit the resulting quote to
    /// `<symbol>/<timeframe>/QUOTE`.
    ///
    /// Returns `None` if the synthesizer suppressed the quote.
    pub fn on_depth(&self, update: &DepthUpdate) -> Option<SubmitOutcome> {
        self.depth_packet(update).map(|packet| self.writer.submit(packet))
    }

    /// Async form of [`on_trade`](Self::on_trade) that awaits queue space
    /// instead of parking a runtime worker.
    pub async fn submit_trade(&self, tick: TradeTick) -> Option<SubmitOutcome> {
        let packet = self.trade_packet(tick)?;
        Some(self.writer.submit_wait(packet).await)
    }

    /// Async form of [`on_depth`](Self::on_depth).
    pub async fn submit_depth(&self, update: &DepthUpdate) -> Option<SubmitOutcome> {
        let packet = self.depth_packet(update)?;
        Some(self.writer.submit_wait(packet).await)
    }

    fn trade_packet(&self, tick: TradeTick) -> Option<WritePacket> {
        if !tick.trade.is_valid() {
            tracing::trace!(symbol = %tick.symbol, price = tick.trade.price, size = tick.trade.size, "Dropping invalid trade");
            metrics::record_event_dropped(DropReason::InvalidTrade);
            return None;
        }

        let key = self.key(tick.symbol, RecordKind::Trade);
        Some(WritePacket::new(key, tick.trade.into()))
    }

    fn depth_packet(&self, update: &DepthUpdate) -> Option<WritePacket> {
        let quote = self.synthesizer.synthesize(&self.gateway, update)?;
        let key = self.key(update.symbol.clone(), RecordKind::Quote);
        Some(WritePacket::new(key, quote.into()))
    }

    fn key(&self, symbol: String, record: RecordKind) -> TimeBucketKey {
        TimeBucketKey::new(symbol, self.timeframe.as_str(), record)
    }

    /// Order-book registry.
    #[must_use]
    pub const fn gateway(&self) -> &OrderBookGateway {
        &self.gateway
    }

    /// Batching writer.
    #[must_use]
    pub const fn writer(&self) -> &BatchingWriter {
        &self.writer
    }

    /// Timeframe used in stream keys.
    #[must_use]
    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    /// Writer counters.
    #[must_use]
    pub fn stats(&self) -> WriterStatsSnapshot {
        self.writer.stats()
    }

    /// Flush everything submitted so far and stop the writer.
    pub async fn shutdown(&self) {
        self.writer.shutdown().await;
    }
}
