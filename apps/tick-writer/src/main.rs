//! Tick Writer Binary
//!
//! Streams trades and book updates from the feed (or a recorded file) into
//! the batching writer.
//!
//! # Usage
//!
//! ```bash
//! TICK_WRITER_FEED_URL=wss://feed.example/stocks cargo run --bin tick-writer
//! TICK_WRITER_REPLAY_FILE=frames.ndjson TICK_WRITER_SINK=jsonl:ticks.jsonl cargo run --bin tick-writer
//! ```
//!
//! # Environment Variables
//!
//! ## Required (one of)
//! - `TICK_WRITER_FEED_URL`: WebSocket feed URL
//! - `TICK_WRITER_REPLAY_FILE`: newline-delimited recorded frames
//!
//! ## Optional
//! - `TICK_WRITER_FEED_KEY`: API key sent in the auth action
//! - `TICK_WRITER_FEED_CHANNELS`: subscription (default: `T.*,B.*`)
//! - `TICK_WRITER_TIMEFRAME`: stream key timeframe (default: 1Min)
//! - `TICK_WRITER_FLUSH_INTERVAL_MS`: flush cadence (default: 100)
//! - `TICK_WRITER_QUEUE_CAPACITY`: 0 = unbounded (default: 0)
//! - `TICK_WRITER_OVERFLOW_POLICY`: drop-oldest | drop-newest | block
//! - `TICK_WRITER_SINK_FAILURE_POLICY`: retain | discard (default: retain)
//! - `TICK_WRITER_SINK_MAX_ATTEMPTS`: retained batch attempts (default: 3)
//! - `TICK_WRITER_QUOTE_EMIT`: always | on-change (default: always)
//! - `TICK_WRITER_SINK`: log | jsonl:<path> (default: log)
//! - `TICK_WRITER_HEALTH_PORT`: health/metrics HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log filter (default: `tick_writer=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tick_writer::application::ports::StorageSink;
use tick_writer::application::services::IngestPipeline;
use tick_writer::infrastructure::config::{FeedSource, SinkSettings, TickWriterConfig};
use tick_writer::infrastructure::feed::{
    FeedClient, FeedClientConfig, FeedHandler, FeedReplay, FeedState,
};
use tick_writer::infrastructure::health::{HealthServer, HealthServerState};
use tick_writer::infrastructure::sink::{JsonLinesSink, LoggingSink};
use tick_writer::infrastructure::{metrics, telemetry};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time allowed for the feed task to stop and the writer to flush.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting tick writer");

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed, metrics disabled");
    }

    let config = TickWriterConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let sink = build_sink(&config.sink).await?;
    let pipeline = Arc::new(IngestPipeline::new(
        config.writer.pipeline_config(),
        sink,
    ));
    let feed_state = Arc::new(FeedState::new());

    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&pipeline),
            Arc::clone(&feed_state),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let handler = FeedHandler::new(Arc::clone(&pipeline));
    let mut feed_task = spawn_feed(&config, handler, Arc::clone(&feed_state), &shutdown_token);

    tracing::info!("Tick writer ready");

    tokio::select! {
        () = await_signal() => {}
        result = &mut feed_task => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Feed task failed");
            }
            tracing::info!("Feed source finished");
        }
    }

    shutdown_token.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    if !feed_task.is_finished()
        && tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut feed_task)
            .await
            .is_err()
    {
        tracing::warn!("Feed task did not stop in time, aborting");
        feed_task.abort();
    }

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, pipeline.shutdown())
        .await
        .is_err()
    {
        tracing::error!("Writer did not finish its final flush in time");
    }

    tracing::info!(stats = ?pipeline.stats(), "Tick writer stopped");
    Ok(())
}

async fn build_sink(settings: &SinkSettings) -> anyhow::Result<Arc<dyn StorageSink>> {
    Ok(match settings {
        SinkSettings::Log => Arc::new(LoggingSink::new()),
        SinkSettings::JsonLines(path) => Arc::new(
            JsonLinesSink::open(path)
                .await
                .with_context(|| format!("failed to open sink file {}", path.display()))?,
        ),
    })
}

fn spawn_feed(
    config: &TickWriterConfig,
    handler: FeedHandler,
    state: Arc<FeedState>,
    cancel: &CancellationToken,
) -> JoinHandle<()> {
    match &config.feed.source {
        FeedSource::WebSocket { url } => {
            let client = FeedClient::new(
                FeedClientConfig::from_settings(url.clone(), &config.feed),
                handler,
                state,
                cancel.clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = client.run().await {
                    tracing::error!(error = %e, "Feed client error");
                }
            })
        }
        FeedSource::Replay { path } => {
            let replay = FeedReplay::new(path, handler, state, cancel.clone());
            tokio::spawn(async move {
                if let Err(e) = replay.run().await {
                    tracing::error!(error = %e, "Replay error");
                }
            })
        }
    }
}

fn log_config(config: &TickWriterConfig) {
    let source = match &config.feed.source {
        FeedSource::WebSocket { url } => url.clone(),
        FeedSource::Replay { path } => format!("replay:{}", path.display()),
    };
    tracing::info!(
        source = %source,
        channels = %config.feed.channels,
        timeframe = %config.writer.timeframe,
        flush_interval_ms = config.writer.flush_interval.as_millis(),
        queue_capacity = config.writer.queue_capacity,
        overflow = config.writer.overflow.as_str(),
        sink_failure = ?config.writer.sink_failure,
        quote_emit = ?config.writer.quote_emit,
        sink = ?config.sink,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
}

fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn await_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
