//! Tick Writer Configuration Settings
//!
//! Configuration types for the service, loaded from environment variables.
//! Numeric values that fail to parse fall back to their defaults; policy
//! names that are not recognised are rejected.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::{
    OverflowPolicy, PipelineConfig, QuoteEmitMode, QueueConfig, SinkFailurePolicy, WriterConfig,
    DEFAULT_FLUSH_INTERVAL, DEFAULT_SINK_MAX_ATTEMPTS,
};
use crate::domain::events::DEFAULT_TIMEFRAME;
use crate::infrastructure::feed::messages::DEFAULT_CHANNELS;

const PREFIX: &str = "TICK_WRITER_";

// =============================================================================
// Feed Settings
// =============================================================================

/// Where feed frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// Live WebSocket feed.
    WebSocket {
        /// Endpoint URL (`ws://` or `wss://`).
        url: String,
    },
    /// Recorded frames, one per line.
    Replay {
        /// File to replay.
        path: PathBuf,
    },
}

/// Feed API key.
#[derive(Clone, PartialEq, Eq)]
pub struct FeedKey(String);

impl FeedKey {
    /// Wrap a key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// Get the key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for FeedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FeedKey([REDACTED])")
    }
}

/// Feed connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// Frame source.
    pub source: FeedSource,
    /// API key sent in the `auth` action, if any.
    pub key: Option<FeedKey>,
    /// Channel list sent in the `subscribe` action.
    pub channels: String,
    /// Keepalive ping interval.
    pub ping_interval: Duration,
    /// Reconnect if nothing arrives for this long.
    pub idle_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl FeedSettings {
    /// Settings for `source` with every other field at its default.
    #[must_use]
    pub fn new(source: FeedSource) -> Self {
        Self {
            source,
            key: None,
            channels: DEFAULT_CHANNELS.to_string(),
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0,
        }
    }
}

// =============================================================================
// Writer Settings
// =============================================================================

/// Writer and pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterSettings {
    /// Timeframe component of stream keys.
    pub timeframe: String,
    /// Flush cadence.
    pub flush_interval: Duration,
    /// Queue capacity (0 = unbounded).
    pub queue_capacity: usize,
    /// Overflow policy for a bounded queue.
    pub overflow: OverflowPolicy,
    /// Sink failure handling.
    pub sink_failure: SinkFailurePolicy,
    /// Quote emission mode.
    pub quote_emit: QuoteEmitMode,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            timeframe: DEFAULT_TIMEFRAME.to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_capacity: 0,
            overflow: OverflowPolicy::DropOldest,
            sink_failure: SinkFailurePolicy::default(),
            quote_emit: QuoteEmitMode::Always,
        }
    }
}

impl WriterSettings {
    /// Build the pipeline configuration.
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        let queue = if self.queue_capacity == 0 {
            QueueConfig::unbounded()
        } else {
            QueueConfig::bounded(self.queue_capacity, self.overflow)
        };

        PipelineConfig {
            timeframe: self.timeframe.clone(),
            quote_emit: self.quote_emit,
            writer: WriterConfig {
                flush_interval: self.flush_interval,
                queue,
                sink_failure: self.sink_failure,
            },
        }
    }
}

// =============================================================================
// Sink and Server Settings
// =============================================================================

/// Which storage sink to use.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SinkSettings {
    /// Log a summary of every batch.
    #[default]
    Log,
    /// Append batches as JSON lines to a file.
    JsonLines(PathBuf),
}

impl SinkSettings {
    /// Parse `log` or `jsonl:<path>`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("log") {
            return Some(Self::Log);
        }
        s.strip_prefix("jsonl:")
            .filter(|path| !path.is_empty())
            .map(|path| Self::JsonLines(PathBuf::from(path)))
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health and metrics HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

// =============================================================================
// Complete Configuration
// =============================================================================

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TickWriterConfig {
    /// Feed settings.
    pub feed: FeedSettings,
    /// Writer settings.
    pub writer: WriterSettings,
    /// Storage sink.
    pub sink: SinkSettings,
    /// Server settings.
    pub server: ServerSettings,
}

impl TickWriterConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if no feed source is configured or a policy name is
    /// not recognised.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if no feed source is configured or a policy name is
    /// not recognised.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let source = match (env.get("FEED_URL")?, env.get("REPLAY_FILE")?) {
            (Some(url), _) => FeedSource::WebSocket { url },
            (None, Some(path)) => FeedSource::Replay {
                path: PathBuf::from(path),
            },
            (None, None) => return Err(ConfigError::MissingEnvVar(format!("{PREFIX}FEED_URL"))),
        };

        let defaults = FeedSettings::new(source.clone());
        let feed = FeedSettings {
            source,
            key: env.get("FEED_KEY")?.map(FeedKey::new),
            channels: env.get("FEED_CHANNELS")?.unwrap_or(defaults.channels),
            ping_interval: env.secs("PING_INTERVAL_SECS", defaults.ping_interval),
            idle_timeout: env.secs("IDLE_TIMEOUT_SECS", defaults.idle_timeout),
            reconnect_delay_initial: env
                .millis("RECONNECT_DELAY_INITIAL_MS", defaults.reconnect_delay_initial),
            reconnect_delay_max: env.secs("RECONNECT_DELAY_MAX_SECS", defaults.reconnect_delay_max),
            reconnect_delay_multiplier: env.parsed(
                "RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env
                .parsed("MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts),
        };

        let defaults = WriterSettings::default();
        let max_attempts = env.parsed("SINK_MAX_ATTEMPTS", DEFAULT_SINK_MAX_ATTEMPTS);
        let writer = WriterSettings {
            timeframe: env.get("TIMEFRAME")?.unwrap_or(defaults.timeframe),
            flush_interval: env.millis("FLUSH_INTERVAL_MS", defaults.flush_interval),
            queue_capacity: env.parsed("QUEUE_CAPACITY", defaults.queue_capacity),
            overflow: env.policy("OVERFLOW_POLICY", defaults.overflow, OverflowPolicy::parse)?,
            sink_failure: env.policy("SINK_FAILURE_POLICY", defaults.sink_failure, |s| {
                SinkFailurePolicy::parse(s, max_attempts)
            })?,
            quote_emit: env.policy("QUOTE_EMIT", defaults.quote_emit, QuoteEmitMode::parse)?,
        };
        if writer.flush_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: format!("{PREFIX}FLUSH_INTERVAL_MS"),
                value: "0".to_string(),
            });
        }

        let sink = env.policy("SINK", SinkSettings::default(), SinkSettings::parse)?;
        let server = ServerSettings {
            health_port: env.parsed("HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            feed,
            writer,
            sink,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0} (or {PREFIX}REPLAY_FILE)")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unrecognised value.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{PREFIX}{name}"))
    }

    /// Unset is `None`; set but blank is an error.
    fn get(&self, name: &str) -> Result<Option<String>, ConfigError> {
        match self.raw(name) {
            Some(value) if value.trim().is_empty() => {
                Err(ConfigError::EmptyValue(format!("{PREFIX}{name}")))
            }
            other => Ok(other.map(|v| v.trim().to_string())),
        }
    }

    fn parsed<T: std::str::FromStr>(&self, name: &str, default: T) -> T {
        self.raw(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, name: &str, default: Duration) -> Duration {
        self.raw(name)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, name: &str, default: Duration) -> Duration {
        self.raw(name)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    fn policy<T>(
        &self,
        name: &str,
        default: T,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, ConfigError> {
        match self.get(name)? {
            None => Ok(default),
            Some(value) => parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: format!("{PREFIX}{name}"),
                value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<TickWriterConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{PREFIX}{k}"), (*v).to_string()))
            .collect();
        TickWriterConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_with_feed_url() {
        let config = config(&[("FEED_URL", "wss://feed.example/stream")]).unwrap();

        assert_eq!(
            config.feed.source,
            FeedSource::WebSocket {
                url: "wss://feed.example/stream".to_string()
            }
        );
        assert_eq!(config.feed.key, None);
        assert_eq!(config.feed.channels, "T.*,B.*");
        assert_eq!(config.feed.reconnect_delay_initial, Duration::from_millis(500));
        assert_eq!(config.feed.max_reconnect_attempts, 0);

        assert_eq!(config.writer, WriterSettings::default());
        assert_eq!(config.writer.flush_interval, Duration::from_millis(100));
        assert_eq!(config.writer.timeframe, "1Min");
        assert_eq!(config.sink, SinkSettings::Log);
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn replay_file_is_a_feed_source() {
        let config = config(&[("REPLAY_FILE", "/tmp/frames.ndjson")]).unwrap();
        assert_eq!(
            config.feed.source,
            FeedSource::Replay {
                path: PathBuf::from("/tmp/frames.ndjson")
            }
        );
    }

    #[test]
    fn feed_source_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn blank_feed_url_is_rejected() {
        assert!(matches!(
            config(&[("FEED_URL", "  ")]),
            Err(ConfigError::EmptyValue(_))
        ));
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            ("FEED_URL", "ws://localhost:9000"),
            ("FEED_KEY", "secret"),
            ("FEED_CHANNELS", "T.AAPL"),
            ("TIMEFRAME", "1Sec"),
            ("FLUSH_INTERVAL_MS", "250"),
            ("QUEUE_CAPACITY", "1000"),
            ("OVERFLOW_POLICY", "drop-newest"),
            ("SINK_FAILURE_POLICY", "retain"),
            ("SINK_MAX_ATTEMPTS", "5"),
            ("QUOTE_EMIT", "on-change"),
            ("SINK", "jsonl:/var/lib/ticks.jsonl"),
            ("HEALTH_PORT", "0"),
            ("MAX_RECONNECT_ATTEMPTS", "7"),
        ])
        .unwrap();

        assert_eq!(config.feed.key.as_ref().map(FeedKey::expose), Some("secret"));
        assert_eq!(config.feed.channels, "T.AAPL");
        assert_eq!(config.feed.max_reconnect_attempts, 7);

        let pipeline = config.writer.pipeline_config();
        assert_eq!(pipeline.timeframe, "1Sec");
        assert_eq!(pipeline.quote_emit, QuoteEmitMode::OnChange);
        assert_eq!(pipeline.writer.flush_interval, Duration::from_millis(250));
        assert_eq!(
            pipeline.writer.queue,
            QueueConfig::bounded(1000, OverflowPolicy::DropNewest)
        );
        assert_eq!(
            pipeline.writer.sink_failure,
            SinkFailurePolicy::Retain { max_attempts: 5 }
        );
        assert_eq!(
            config.sink,
            SinkSettings::JsonLines(PathBuf::from("/var/lib/ticks.jsonl"))
        );
        assert_eq!(config.server.health_port, 0);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = config(&[
            ("FEED_URL", "ws://localhost:9000"),
            ("FLUSH_INTERVAL_MS", "soon"),
            ("QUEUE_CAPACITY", "-1"),
        ])
        .unwrap();
        assert_eq!(config.writer.flush_interval, Duration::from_millis(100));
        assert_eq!(config.writer.pipeline_config().writer.queue, QueueConfig::unbounded());
    }

    #[test]
    fn zero_flush_interval_is_rejected() {
        assert!(matches!(
            config(&[("FEED_URL", "ws://x"), ("FLUSH_INTERVAL_MS", "0")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test_case("OVERFLOW_POLICY", "spill" ; "overflow")]
    #[test_case("SINK_FAILURE_POLICY", "retry" ; "sink failure")]
    #[test_case("QUOTE_EMIT", "never" ; "quote emit")]
    #[test_case("SINK", "kafka" ; "sink")]
    fn unknown_policy_names_are_rejected(name: &str, value: &str) {
        let err = config(&[("FEED_URL", "ws://x"), (name, value)]).unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidValue { key, value: v } if key.ends_with(name) && v == value)
        );
    }

    #[test_case("log" => Some(SinkSettings::Log))]
    #[test_case("LOG" => Some(SinkSettings::Log))]
    #[test_case("jsonl:/tmp/a.jsonl" => Some(SinkSettings::JsonLines(PathBuf::from("/tmp/a.jsonl"))))]
    #[test_case("jsonl:" => None)]
    #[test_case("parquet" => None)]
    fn sink_parsing(input: &str) -> Option<SinkSettings> {
        SinkSettings::parse(input)
    }

    #[test]
    fn feed_key_redacted_debug() {
        let debug = format!("{:?}", FeedKey::new("key123".to_string()));
        assert!(!debug.contains("key123"));
        assert!(debug.contains("[REDACTED]"));
    }
}
