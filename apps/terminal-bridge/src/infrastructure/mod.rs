//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus process-wide concerns.

/// Environment-driven configuration.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Scripted and transcript-replay session adapter.
pub mod replay;

/// OpenTelemetry tracing integration.
pub mod telemetry;
