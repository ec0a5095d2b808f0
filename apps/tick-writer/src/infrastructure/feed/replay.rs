//! Frame Replay
//!
//! Feeds a file of recorded frames, one JSON frame per line, through the
//! same [`FeedHandler`] the live client uses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::handler::{FeedHandler, FrameSummary};
use super::state::{ConnectionState, FeedState};

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The file could not be opened or read.
    #[error("failed to read replay file {path}: {source}")]
    Io {
        /// File being replayed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Totals for a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Lines read.
    pub lines: u64,
    /// Trades submitted.
    pub trades: u64,
    /// Quotes submitted.
    pub quotes: u64,
    /// Elements dropped without error.
    pub dropped: u64,
    /// Elements or lines that failed to decode.
    pub errors: u64,
}

impl ReplaySummary {
    fn absorb(&mut self, frame: &FrameSummary) {
        self.trades += frame.trades as u64;
        self.quotes += frame.quotes as u64;
        self.dropped += frame.dropped as u64;
        self.errors += frame.errors as u64;
    }
}

/// Replays a recorded frame file.
pub struct FeedReplay {
    path: PathBuf,
    handler: FeedHandler,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl FeedReplay {
    /// Create a replay of `path`.
    #[must_use]
    pub fn new(
        path: impl AsRef<Path>,
        handler: FeedHandler,
        state: Arc<FeedState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            handler,
            state,
            cancel,
        }
    }

    /// Read the file to the end, or until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub async fn run(self) -> Result<ReplaySummary, ReplayError> {
        let io_error = |source| ReplayError::Io {
            path: self.path.clone(),
            source,
        };

        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            self.state.set_error(e.to_string());
            io_error(e)
        })?;
        tracing::info!(path = %self.path.display(), "Replaying recorded frames");
        self.state.set_state(ConnectionState::Connected);

        let mut lines = BufReader::new(file).lines();
        let mut summary = ReplaySummary::default();

        loop {
            let line = tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!(lines = summary.lines, "Replay cancelled");
                    self.state.set_state(ConnectionState::Disconnected);
                    return Ok(summary);
                }
                line = lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => {
                    summary.lines += 1;
                    if !line.trim().is_empty() {
                        self.state.increment_frames();
                    }
                    summary.absorb(&self.handler.handle_line(&line).await);
                }
                Ok(None) => break,
                Err(e) => {
                    self.state.set_error(e.to_string());
                    return Err(io_error(e));
                }
            }
        }

        tracing::info!(
            lines = summary.lines,
            trades = summary.trades,
            quotes = summary.quotes,
            dropped = summary.dropped,
            errors = summary.errors,
            "Replay finished"
        );
        self.state.set_state(ConnectionState::Finished);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::application::services::{IngestPipeline, PipelineConfig};
    use crate::domain::columns::PRICE;
    use crate::domain::events::TimeBucketKey;
    use crate::infrastructure::sink::MemorySink;

    fn replay(path: &Path) -> (FeedReplay, Arc<IngestPipeline>, Arc<MemorySink>, Arc<FeedState>) {
        let sink = Arc::new(MemorySink::new());
        let pipeline = Arc::new(IngestPipeline::new(PipelineConfig::default(), sink.clone()));
        let state = Arc::new(FeedState::new());
        let replay = FeedReplay::new(
            path,
            FeedHandler::new(pipeline.clone()),
            state.clone(),
            CancellationToken::new(),
        );
        (replay, pipeline, sink, state)
    }

    #[tokio::test]
    async fn replays_every_line_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"[{{"ev":"T","S":"AAPL","p":1.0,"s":1,"t":1700000000000}}]"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"[{{"ev":"T","S":"AAPL","p":2.0,"s":1,"t":1700000001000}},{{"ev":"B","S":"MSFT","b":[[300.0,5]]}}]"#).unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, r#"[{{"ev":"T","S":"AAPL","p":-1.0,"s":1}}]"#).unwrap();

        let (replay, pipeline, sink, state) = replay(file.path());
        let summary = replay.run().await.unwrap();

        assert_eq!(
            summary,
            ReplaySummary {
                lines: 5,
                trades: 2,
                quotes: 1,
                dropped: 1,
                errors: 1,
            }
        );
        assert_eq!(state.get_state(), ConnectionState::Finished);
        assert_eq!(state.status().frames_received, 4);

        pipeline.shutdown().await;
        let merged = sink.merged();
        let prices = merged
            .get(&TimeBucketKey::trade("AAPL"))
            .unwrap()
            .column(PRICE)
            .unwrap()
            .as_f32()
            .unwrap()
            .to_vec();
        assert_eq!(prices, vec![1.0, 2.0]);
        assert!(merged.get(&TimeBucketKey::quote("MSFT")).is_some());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (replay, pipeline, _sink, state) = replay(&dir.path().join("absent.ndjson"));

        assert!(matches!(replay.run().await, Err(ReplayError::Io { .. })));
        assert_eq!(state.get_state(), ConnectionState::Error);
        pipeline.shutdown().await;
    }
}
