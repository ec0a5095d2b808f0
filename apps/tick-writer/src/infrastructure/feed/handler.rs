//! Feed Handler
//!
//! Glue between raw feed frames and the ingest pipeline. Decode faults are
//! logged and counted here and never propagate past the element that
//! caused them.
//!
//! Handlers run on the runtime, so submission goes through the pipeline's
//! async path and a full `Block` queue suspends the frame instead of
//! parking a worker.

use std::sync::Arc;

use serde_json::Value;

use super::codec::{DecodeError, FeedDecoder, FeedItem};
use super::messages::StatusMessage;
use crate::application::services::IngestPipeline;
use crate::domain::events::{DepthUpdate, TradeTick};
use crate::infrastructure::metrics::{self, DropReason};

/// What one frame (or raw array) produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Trades submitted to the writer.
    pub trades: usize,
    /// Quotes submitted to the writer.
    pub quotes: usize,
    /// Elements dropped without error (invalid trades, suppressed quotes,
    /// rejected packets).
    pub dropped: usize,
    /// Elements that failed to decode.
    pub errors: usize,
    /// Control messages, in frame order.
    pub statuses: Vec<StatusMessage>,
}

/// Routes decoded feed elements into an [`IngestPipeline`].
#[derive(Debug, Clone)]
pub struct FeedHandler {
    decoder: FeedDecoder,
    pipeline: Arc<IngestPipeline>,
}

impl FeedHandler {
    /// Create a handler for `pipeline`.
    #[must_use]
    pub const fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self {
            decoder: FeedDecoder::new(),
            pipeline,
        }
    }

    /// The pipeline this handler feeds.
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<IngestPipeline> {
        &self.pipeline
    }

    /// Handle one live frame: a JSON array of `ev`-tagged elements.
    pub async fn handle_frame(&self, text: &str) -> FrameSummary {
        metrics::record_feed_frame();

        let items = match self.decoder.split_frame(text) {
            Ok(items) => items,
            Err(e) => {
                report(&e, "frame");
                return FrameSummary {
                    errors: 1,
                    ..FrameSummary::default()
                };
            }
        };

        let mut summary = FrameSummary::default();
        for item in items {
            match item {
                FeedItem::Trade(raw) => {
                    let decoded = self.decoder.decode_trade(&raw);
                    self.submit_trade(decoded, &mut summary).await;
                }
                FeedItem::Depth(raw) => {
                    let decoded = self.decoder.decode_depth(&raw);
                    self.submit_depth(decoded, &mut summary).await;
                }
                FeedItem::Status(status) => summary.statuses.push(status),
                FeedItem::Unknown(ev) => {
                    tracing::trace!(ev = ?ev, "Ignoring unhandled feed element");
                }
            }
        }
        summary
    }

    /// Handle a raw array (or single object) of trade elements.
    pub async fn handle_trades(&self, raw: &Value) -> FrameSummary {
        let mut summary = FrameSummary::default();
        match self.decoder.decode_trades(raw) {
            Ok(results) => {
                for result in results {
                    self.submit_trade(result, &mut summary).await;
                }
            }
            Err(e) => {
                report(&e, "trade");
                summary.errors += 1;
            }
        }
        summary
    }

    /// Handle a raw array (or single object) of book elements.
    pub async fn handle_depths(&self, raw: &Value) -> FrameSummary {
        let mut summary = FrameSummary::default();
        match self.decoder.decode_depths(raw) {
            Ok(results) => {
                for result in results {
                    self.submit_depth(result, &mut summary).await;
                }
            }
            Err(e) => {
                report(&e, "depth");
                summary.errors += 1;
            }
        }
        summary
    }

    /// Handle one recorded line. Blank lines are skipped.
    pub async fn handle_line(&self, line: &str) -> FrameSummary {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return FrameSummary::default();
        }
        self.handle_frame(trimmed).await
    }

    async fn submit_trade(
        &self,
        result: Result<Option<TradeTick>, DecodeError>,
        summary: &mut FrameSummary,
    ) {
        match result {
            Ok(Some(tick)) => match self.pipeline.submit_trade(tick).await {
                Some(outcome) if outcome.is_accepted() => summary.trades += 1,
                _ => summary.dropped += 1,
            },
            Ok(None) => {
                tracing::trace!("Dropping trade with non-positive price or size");
                metrics::record_event_dropped(DropReason::InvalidTrade);
                summary.dropped += 1;
            }
            Err(e) => {
                report(&e, "trade");
                summary.errors += 1;
            }
        }
    }

    async fn submit_depth(
        &self,
        result: Result<DepthUpdate, DecodeError>,
        summary: &mut FrameSummary,
    ) {
        match result {
            Ok(update) => match self.pipeline.submit_depth(&update).await {
                Some(outcome) if outcome.is_accepted() => summary.quotes += 1,
                _ => summary.dropped += 1,
            },
            Err(e) => {
                report(&e, "depth");
                summary.errors += 1;
            }
        }
    }
}

fn report(error: &DecodeError, message_type: &str) {
    tracing::error!(error = %error, message_type, "Failed to decode feed message");
    metrics::record_decode_error(message_type);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use std::time::Duration;

    use super::*;
    use crate::application::services::{
        OverflowPolicy, PipelineConfig, QueueConfig, WriterConfig,
    };
    use crate::domain::events::TimeBucketKey;
    use crate::infrastructure::sink::MemorySink;

    fn handler() -> (FeedHandler, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let pipeline = Arc::new(IngestPipeline::new(PipelineConfig::default(), sink.clone()));
        (FeedHandler::new(pipeline), sink)
    }

    #[tokio::test]
    async fn frame_routes_trades_and_books() {
        let (handler, sink) = handler();

        let summary = handler.handle_frame(
            r#"[
                {"ev":"status","status":"auth_success","message":"authenticated"},
                {"ev":"T","S":"AAPL","p":150.25,"s":10,"t":1700000000000,"T":500000},
                {"ev":"T","S":"AAPL","p":0,"s":10},
                {"ev":"T","p":1.0,"s":1},
                {"ev":"B","S":"MSFT","b":[[300.0,5]],"a":[[300.5,7]]}
            ]"#,
        ).await;

        assert_eq!(summary.trades, 1);
        assert_eq!(summary.quotes, 1);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.statuses.len(), 1);
        assert_eq!(summary.statuses[0].status, "auth_success");

        handler.pipeline().shutdown().await;
        let batch = sink.merged();
        assert_eq!(batch.get(&TimeBucketKey::trade("AAPL")).unwrap().len(), 1);
        assert_eq!(batch.get(&TimeBucketKey::quote("MSFT")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_frame_counts_one_error() {
        let (handler, _sink) = handler();
        let summary = handler.handle_frame("not json").await;
        assert_eq!(summary.errors, 1);
        handler.pipeline().shutdown().await;
    }

    #[tokio::test]
    async fn raw_trade_fan_out() {
        let (handler, sink) = handler();

        let summary = handler.handle_trades(&json!([
            {"S": "AAPL", "p": 1.0, "s": 1},
            {"S": "AAPL", "p": 2.0, "s": 1},
            {"p": 3.0, "s": 1}
        ])).await;
        assert_eq!(summary.trades, 2);
        assert_eq!(summary.errors, 1);

        handler.pipeline().shutdown().await;
        assert_eq!(sink.total_rows(), 2);
    }

    #[tokio::test]
    async fn raw_depth_fan_out() {
        let (handler, _sink) = handler();

        let summary = handler.handle_depths(&json!([
            {"S": "MSFT", "b": [[300.0, 5]]},
            {"S": "IBM", "a": [[150.0, 1]]}
        ])).await;
        assert_eq!(summary.quotes, 2);
        assert_eq!(handler.pipeline().gateway().symbol_count(), 2);

        handler.pipeline().shutdown().await;
    }

    #[tokio::test]
    async fn blank_line_is_ignored() {
        let (handler, _sink) = handler();
        assert_eq!(handler.handle_line("   ").await, FrameSummary::default());
        handler.pipeline().shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn full_blocking_queue_does_not_starve_the_consumer() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = Arc::new(IngestPipeline::new(
            PipelineConfig {
                writer: WriterConfig {
                    queue: QueueConfig::bounded(1, OverflowPolicy::Block),
                    ..WriterConfig::default()
                },
                ..PipelineConfig::default()
            },
            sink.clone(),
        ));
        let handler = FeedHandler::new(pipeline.clone());

        let producer = tokio::spawn(async move {
            handler
                .handle_trades(&json!([
                    {"S": "AAPL", "p": 1.0, "s": 1},
                    {"S": "AAPL", "p": 2.0, "s": 1},
                    {"S": "AAPL", "p": 3.0, "s": 1}
                ]))
                .await
        });

        let summary = tokio::time::timeout(Duration::from_secs(5), producer)
            .await
            .expect("producer finished while the queue was full")
            .unwrap();
        assert_eq!(summary.trades, 3);

        pipeline.shutdown().await;
        assert_eq!(sink.total_rows(), 3);
    }
}
