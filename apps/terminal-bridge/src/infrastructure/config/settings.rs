//! Bridge Settings
//!
//! Settings read from the process environment, with `.env` support.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::ports::SessionOptions;
use crate::domain::exchange::ExchangeDirectory;

const HOST_VAR: &str = "TERMINAL_BRIDGE_HOST";
const PORT_VAR: &str = "TERMINAL_BRIDGE_PORT";
const TIMEOUT_VAR: &str = "TERMINAL_BRIDGE_TIMEOUT_MS";
const EXCHANGE_TABLE_VAR: &str = "TERMINAL_BRIDGE_EXCHANGE_TABLE";

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Terminal session settings.
    pub session: SessionOptions,
    /// JSON exchange table layered over the built-in directory.
    pub exchange_table: Option<PathBuf>,
}

impl BridgeConfig {
    /// Create configuration from environment variables, loading `.env` first
    /// when one is present.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or unparsable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SessionOptions::default();

        let host = match lookup(HOST_VAR) {
            Some(host) if host.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(HOST_VAR.to_string()));
            }
            Some(host) => host.trim().to_string(),
            None => defaults.host,
        };

        let session = SessionOptions {
            host,
            port: parse_env_u16(&lookup, PORT_VAR, defaults.port)?,
            timeout: parse_env_duration_millis(&lookup, TIMEOUT_VAR, defaults.timeout)?,
        };

        let exchange_table = match lookup(EXCHANGE_TABLE_VAR) {
            Some(path) if path.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(EXCHANGE_TABLE_VAR.to_string()));
            }
            Some(path) => Some(PathBuf::from(path.trim())),
            None => None,
        };

        Ok(Self {
            session,
            exchange_table,
        })
    }

    /// Session options for a session implementation.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        self.session.clone()
    }

    /// The built-in exchange directory, extended with the configured table.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured table cannot be read or parsed.
    pub fn exchange_directory(&self) -> crate::error::Result<ExchangeDirectory> {
        let mut directory = ExchangeDirectory::builtin();
        if let Some(path) = &self.exchange_table {
            let table = ExchangeDirectory::from_json_file(path)?;
            tracing::debug!(path = %path.display(), exchanges = table.len(), "Loaded exchange table");
            directory.extend(table);
        }
        Ok(directory)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Load `.env` from the working directory or the nearest ancestor holding one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    let Some(path) = std::env::current_dir()
        .ok()
        .and_then(|cwd| ancestor_env_file(&cwd))
    else {
        tracing::debug!("No .env file found");
        return;
    };
    match dotenvy::from_path(&path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "Failed to load .env"),
    }
}

/// Nearest `.env` strictly above `start`.
fn ancestor_env_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .skip(1)
        .map(|dir| dir.join(".env"))
        .find(|path| path.is_file())
}

fn parse_env_u16<F>(lookup: &F, key: &str, default: u16) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(Ok(default), |v| {
        v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        })
    })
}

fn parse_env_duration_millis<F>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(Ok(default), |v| {
        v.trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: v,
            })
    })
}
