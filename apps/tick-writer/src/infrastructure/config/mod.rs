//! Configuration Module
//!
//! Environment-driven configuration for the writer service.

mod settings;

pub use settings::{
    ConfigError, FeedKey, FeedSettings, FeedSource, ServerSettings, SinkSettings,
    TickWriterConfig, WriterSettings,
};
