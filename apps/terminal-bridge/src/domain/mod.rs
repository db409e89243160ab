//! Domain Layer - Request shaping, response reconciliation and analytics.
//!
//! Pure logic with no I/O. Vendor events arrive here already decoded into
//! the [`response`] model; everything else is tabular reshaping and maths.

/// Ticker normalisation.
pub mod security;

/// Field values and sentinels.
pub mod value;

/// Override and option grouping.
pub mod overrides;

/// Vendor event and message model.
pub mod response;

/// Reference and bulk parsing, input alignment.
pub mod reconcile;

/// Historical data parsing and tables.
pub mod history;

/// Intraday ticks and bars.
pub mod ticks;

/// Exchange directory and session windows.
pub mod exchange;

/// Bid/ask/trade session statistics.
pub mod statistics;

/// Portfolio holdings and basket spread.
pub mod portfolio;
