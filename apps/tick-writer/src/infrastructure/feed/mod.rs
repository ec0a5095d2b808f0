//! Market Data Feed Adapters
//!
//! Everything between raw feed frames and the ingest pipeline:
//!
//! - **Client**: live WebSocket session with reconnect
//! - **Replay**: recorded frames from a file
//! - **Codec / Handler**: decoding and routing into the pipeline

pub mod client;
pub mod codec;
pub mod handler;
pub mod messages;
pub mod reconnect;
pub mod replay;
pub mod state;

pub use client::{FeedClient, FeedClientConfig, FeedClientError};
pub use codec::{DecodeError, FeedDecoder, FeedItem};
pub use handler::{FeedHandler, FrameSummary};
pub use messages::{ControlRequest, DepthMessage, StatusMessage, TradeMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use replay::{FeedReplay, ReplayError, ReplaySummary};
pub use state::{ConnectionState, FeedState, FeedStatus};
