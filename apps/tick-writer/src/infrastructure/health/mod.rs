//! Health Check and Metrics Endpoint
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status: feed state and writer counters
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (feed delivering, writer running)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{IngestPipeline, WriterStatsSnapshot};
use crate::infrastructure::feed::{ConnectionState, FeedState, FeedStatus};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed connection status.
    pub feed: FeedStatus,
    /// Writer status.
    pub writer: WriterStatus,
}

/// Writer section of [`HealthResponse`].
#[derive(Debug, Clone, Serialize)]
pub struct WriterStatus {
    /// Whether the consumer task is alive.
    pub running: bool,
    /// Packets waiting in the inbound queue.
    pub queue_len: usize,
    /// Events buffered for the next flush.
    pub pending_events: usize,
    /// Symbols with an order book.
    pub symbols: usize,
    /// Lifetime counters.
    pub stats: WriterStatsSnapshot,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed delivering and writer running.
    Healthy,
    /// Writer running but the feed is between sessions.
    Degraded,
    /// Writer stopped or feed failed.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    pipeline: Arc<IngestPipeline>,
    feed: Arc<FeedState>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, pipeline: Arc<IngestPipeline>, feed: Arc<FeedState>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            pipeline,
            feed,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);

    if response.status == HealthStatus::Healthy {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = state.feed.status();
    let writer = state.pipeline.writer();
    let writer = WriterStatus {
        running: writer.is_running(),
        queue_len: writer.queue_len(),
        pending_events: writer.pending_events(),
        symbols: state.pipeline.gateway().symbol_count(),
        stats: writer.stats(),
    };

    HealthResponse {
        status: determine_health_status(feed.state, writer.running),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed,
        writer,
    }
}

fn determine_health_status(feed: ConnectionState, writer_running: bool) -> HealthStatus {
    if !writer_running {
        return HealthStatus::Unhealthy;
    }
    match feed {
        ConnectionState::Connected | ConnectionState::Finished => HealthStatus::Healthy,
        ConnectionState::Error => HealthStatus::Unhealthy,
        ConnectionState::Disconnected
        | ConnectionState::Connecting
        | ConnectionState::Authenticating
        | ConnectionState::Reconnecting => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::response::Response;
    use test_case::test_case;

    use super::*;
    use crate::application::services::PipelineConfig;
    use crate::infrastructure::sink::MemorySink;

    fn state() -> Arc<HealthServerState> {
        let pipeline = Arc::new(IngestPipeline::new(
            PipelineConfig::default(),
            Arc::new(MemorySink::new()),
        ));
        Arc::new(HealthServerState::new(
            "test".to_string(),
            pipeline,
            Arc::new(FeedState::new()),
        ))
    }

    #[test_case(ConnectionState::Connected, true => HealthStatus::Healthy)]
    #[test_case(ConnectionState::Finished, true => HealthStatus::Healthy)]
    #[test_case(ConnectionState::Reconnecting, true => HealthStatus::Degraded)]
    #[test_case(ConnectionState::Disconnected, true => HealthStatus::Degraded)]
    #[test_case(ConnectionState::Error, true => HealthStatus::Unhealthy)]
    #[test_case(ConnectionState::Connected, false => HealthStatus::Unhealthy)]
    fn status_from_feed_and_writer(feed: ConnectionState, running: bool) -> HealthStatus {
        determine_health_status(feed, running)
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[tokio::test]
    async fn readiness_follows_feed_state() {
        let state = state();

        let response: Response = readiness_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.feed.set_state(ConnectionState::Connected);
        let response: Response = readiness_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        state.pipeline.shutdown().await;
        let response: Response = readiness_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_report_includes_writer_counters() {
        let state = state();
        state.feed.set_state(ConnectionState::Connected);

        let report = build_health_response(&state);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.writer.running);
        assert_eq!(report.writer.stats, WriterStatsSnapshot::default());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["feed"]["state"], "connected");
        assert_eq!(json["writer"]["queue_len"], 0);

        state.pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness_handler().await.into_response().status(), StatusCode::OK);
    }
}
