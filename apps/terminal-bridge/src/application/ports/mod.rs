//! Application Ports (Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! The only driven port is the terminal session; adapters live in
//! `infrastructure`.

mod session_port;

pub use session_port::{
    NamedValue, Request, ScreenType, Service, SessionError, SessionOptions, SessionPort,
};
