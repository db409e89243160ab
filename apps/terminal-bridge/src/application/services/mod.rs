//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Connection`: Owns the session, opens services and drains events for
//!   each request

mod connection;

pub use connection::{
    Connection, DatedRow, InstrumentRow, PIT_DATE_OVERRIDE, REFERENCE_DATE_OVERRIDE,
};
