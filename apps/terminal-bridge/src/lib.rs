#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Terminal Bridge - Request shaping and reconciliation for a market data terminal
//!
//! A typed client layer over a market data terminal session. Callers pass
//! lists of tickers, fields and overrides; the bridge groups them into the
//! fewest vendor requests, drains the asynchronous event stream for each one
//! and reconciles the answers back into rows aligned with the caller's input.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure reshaping and analytics
//!   - `security`, `value`, `overrides`: Ticker normalisation, sentinels, grouping
//!   - `response`, `reconcile`: Vendor event model and input alignment
//!   - `history`, `ticks`: Historical tables, intraday ticks and bars
//!   - `exchange`, `statistics`: Trading sessions and bid/ask/trade analysis
//!   - `portfolio`: Holdings, reweighting and basket spreads
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The terminal session interface
//!   - `services`: Session lifecycle and event draining
//!   - `use_cases`: One use case per query family
//!
//! - **Infrastructure**: Adapters and process-wide concerns
//!   - `replay`: Scripted and transcript-driven sessions
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus counters and histograms
//!   - `telemetry`: Tracing subscriber and OpenTelemetry export
//!
//! # Data Flow
//!
//! ```text
//! tickers, fields, ──► group by ──► Connection ──► SessionPort
//! overrides            overrides    send + drain      │
//!                                        ▲            ▼
//! rows in input ◄── align to ◄── parse ──┴──── events (Partial*, Response)
//! order             input
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Request shaping and reconciliation with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Error taxonomy shared by every layer.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Errors
pub use error::{BridgeError, ErrorCode, Result};

// Domain types
pub use domain::security::{SecurityId, normalize};
pub use domain::value::{BulkRow, FieldValue};

// Session port and connection
pub use application::ports::{NamedValue, Request, SessionOptions, SessionPort};
pub use application::services::Connection;

// Use cases
pub use application::use_cases::{
    BasketSpreadUseCase, BulkDataUseCase, ExchangeResolutionUseCase, HistoricalDataUseCase,
    HolderRow, HoldersUseCase, IntradayUseCase, PortfolioUseCase, ReferenceDataUseCase,
    SearchUseCase, SessionStatisticsUseCase,
};

// Infrastructure config
pub use infrastructure::config::{BridgeConfig, ConfigError};

// Scripted sessions
pub use infrastructure::replay::{ScriptedSession, Transcript};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
