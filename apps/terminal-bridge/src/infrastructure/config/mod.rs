//! Configuration Module
//!
//! Environment-driven settings for the terminal session and exchange table.

mod settings;

pub use settings::{BridgeConfig, ConfigError};
