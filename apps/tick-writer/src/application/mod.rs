//! Application Layer - Use cases and port definitions.
//!
//! Services that turn decoded feed events into keyed packets and batch
//! them for storage, plus the port interfaces they depend on.

/// Port interfaces for external collaborators (order book, storage sink).
pub mod ports;

/// Ingest, aggregation and batching services.
pub mod services;
