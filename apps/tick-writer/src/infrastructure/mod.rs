//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the process
//! plumbing around them.

/// Configuration loading.
pub mod config;

/// Feed client, replay and frame decoding.
pub mod feed;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Storage sink implementations.
pub mod sink;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
