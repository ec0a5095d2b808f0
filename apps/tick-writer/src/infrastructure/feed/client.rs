//! Feed WebSocket Client
//!
//! Connects to the market data feed, performs the auth/subscribe handshake
//! and hands every text frame to the [`FeedHandler`].
//!
//! # Session
//!
//! 1. Connect.
//! 2. If a key is configured, send `{"action":"auth","params":"<key>"}` and
//!    wait for `auth_success`.
//! 3. Send `{"action":"subscribe","params":"<channels>"}`.
//! 4. Stream data frames until the socket closes, goes idle or the client
//!    is cancelled.
//!
//! Lost sessions are retried with exponential backoff. An authentication
//! rejection is not retried.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::handler::FeedHandler;
use super::messages::{ControlRequest, StatusMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{ConnectionState, FeedState};
use crate::infrastructure::config::{FeedKey, FeedSettings};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A control request could not be encoded.
    #[error("failed to encode control request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The server rejected the key.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server reported a fatal status.
    #[error("server error: {0}")]
    ServerError(String),

    /// Nothing was received within the idle timeout.
    #[error("no frames received for {0:?}")]
    IdleTimeout(Duration),

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FeedClientError {
    const fn is_retryable(&self) -> bool {
        !matches!(self, Self::AuthenticationFailed(_))
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// API key, if the feed requires one.
    pub key: Option<FeedKey>,
    /// Channel list to subscribe to.
    pub channels: String,
    /// Keepalive ping interval.
    pub ping_interval: Duration,
    /// Reconnect if nothing arrives for this long.
    pub idle_timeout: Duration,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
}

impl FeedClientConfig {
    /// Build from feed settings and a resolved URL.
    #[must_use]
    pub fn from_settings(url: String, settings: &FeedSettings) -> Self {
        Self {
            url,
            key: settings.key.clone(),
            channels: settings.channels.clone(),
            ping_interval: settings.ping_interval,
            idle_timeout: settings.idle_timeout,
            reconnect: ReconnectConfig::from_feed_settings(settings),
        }
    }
}

/// What a status element means for the session.
#[derive(Debug, PartialEq, Eq)]
enum StatusAction {
    /// Nothing to do.
    None,
    /// The key was accepted; subscribe now.
    Subscribe,
}

// =============================================================================
// Feed Client
// =============================================================================

/// WebSocket feed client.
pub struct FeedClient {
    config: FeedClientConfig,
    handler: FeedHandler,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a new client.
    #[must_use]
    pub const fn new(
        config: FeedClientConfig,
        handler: FeedHandler,
        state: Arc<FeedState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            handler,
            state,
            cancel,
        }
    }

    /// Run the connection loop until cancelled or retries are exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication is rejected or the reconnect
    /// budget runs out.
    pub async fn run(self) -> Result<(), FeedClientError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                self.state.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            match self.connect_and_run(&mut reconnect_policy).await {
                Ok(()) => {
                    tracing::info!("Feed client stopped");
                    self.state.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!(error = %e, "Feed session rejected");
                    self.state.set_error(e.to_string());
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed connection error");
                    self.state.record_error(e.to_string());

                    let Some(delay) = reconnect_policy.next_delay() else {
                        self.state
                            .set_error(FeedClientError::MaxReconnectAttemptsExceeded.to_string());
                        return Err(FeedClientError::MaxReconnectAttemptsExceeded);
                    };

                    let attempt = reconnect_policy.attempt_count();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to feed"
                    );
                    self.state.set_state(ConnectionState::Reconnecting);
                    self.state.increment_reconnect_attempts();

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Feed client cancelled during reconnect delay");
                            self.state.set_state(ConnectionState::Disconnected);
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One session: connect, handshake, stream.
    async fn connect_and_run(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedClientError> {
        tracing::info!(url = %self.config.url, "Connecting to feed");
        self.state.set_state(ConnectionState::Connecting);

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            connected = tokio_tungstenite::connect_async(&self.config.url) => connected?,
        };
        let (mut write, mut read) = ws_stream.split();

        if let Some(key) = &self.config.key {
            self.state.set_state(ConnectionState::Authenticating);
            let auth = ControlRequest::auth(key.expose()).to_json()?;
            write.send(Message::Text(auth.into())).await?;
        } else {
            self.subscribe(&mut write).await?;
            reconnect_policy.reset();
        }

        let mut ping = tokio::time::interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    if last_frame.elapsed() >= self.config.idle_timeout {
                        return Err(FeedClientError::IdleTimeout(self.config.idle_timeout));
                    }
                    write.send(Message::Ping(Vec::new().into())).await?;
                }
                msg = read.next() => {
                    last_frame = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.state.increment_frames();
                            let summary = self.handler.handle_frame(&text).await;
                            for status in &summary.statuses {
                                if self.on_status(status)? == StatusAction::Subscribe {
                                    self.subscribe(&mut write).await?;
                                    reconnect_policy.reset();
                                }
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.state.increment_frames();
                            match std::str::from_utf8(&data) {
                                Ok(text) => {
                                    self.handler.handle_frame(text).await;
                                }
                                Err(e) => tracing::warn!(error = %e, "Ignoring non-UTF-8 binary frame"),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    async fn subscribe<W>(&self, write: &mut W) -> Result<(), FeedClientError>
    where
        W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let request = ControlRequest::subscribe(self.config.channels.clone()).to_json()?;
        write.send(Message::Text(request.into())).await?;
        tracing::info!(channels = %self.config.channels, "Subscribed to feed");
        self.state.set_state(ConnectionState::Connected);
        Ok(())
    }

    fn on_status(&self, status: &StatusMessage) -> Result<StatusAction, FeedClientError> {
        tracing::debug!(status = %status.status, message = %status.message, "Feed status");

        match status.status.as_str() {
            "auth_success" if self.state.get_state() == ConnectionState::Authenticating => {
                tracing::info!("Feed authenticated");
                Ok(StatusAction::Subscribe)
            }
            "auth_failed" | "auth_timeout" => {
                Err(FeedClientError::AuthenticationFailed(status.message.clone()))
            }
            _ if status.is_fatal() => Err(FeedClientError::ServerError(status.message.clone())),
            _ => Ok(StatusAction::None),
        }
    }
}
