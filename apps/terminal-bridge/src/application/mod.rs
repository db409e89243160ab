//! Application Layer - Use cases, services and the session port.
//!
//! Use cases shape a caller's query into vendor requests, drive them through
//! the shared [`services::Connection`] and reconcile the answers with the
//! domain layer.

/// Port interface for the terminal session.
pub mod ports;

/// Session lifecycle and request/response exchange.
pub mod services;

/// One use case per query family (BDP, BDH, BDS, BDIT, MEMB, ...).
pub mod use_cases;
