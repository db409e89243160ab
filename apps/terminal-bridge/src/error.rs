//! Rich error handling for the terminal bridge.
//!
//! Every fallible operation returns a [`BridgeError`] carrying an
//! [`ErrorCode`], a human-readable message and optional key/value context
//! (ticker, field, request type) for debugging.
//!
//! # Error Codes
//!
//! | Code | Usage |
//! |------|-------|
//! | `INVALID_REQUEST` | Malformed request (override lengths, empty date lists) |
//! | `INVALID_FIELD` | Vendor flagged a requested field as `INVALID_FIELD` |
//! | `UNSUPPORTED_FIELD` | Bulk field requested as scalar or vice versa |
//! | `SECURITY_ERROR` | Vendor could not resolve a security where that is fatal |
//! | `SESSION_START_FAILED` | Session did not start |
//! | `SERVICE_UNAVAILABLE` | A vendor service could not be opened |
//! | `UNEXPECTED_EVENT` | Event stream delivered an event of the wrong kind |
//! | `TIMEOUT` | No event arrived within the configured timeout |
//! | `SESSION_FAILURE` | Transport level failure reported by the session |
//! | `EXCHANGE_NOT_FOUND` | No exchange metadata for a ticker |
//! | `NO_DATA` | A request completed but produced nothing usable |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for the terminal bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request validation
    /// Invalid request format or inconsistent parameters.
    InvalidRequest,
    /// Field rejected by the vendor as invalid.
    InvalidField,
    /// Field shape does not match the request kind (bulk vs scalar).
    UnsupportedField,

    // Vendor data errors
    /// Security could not be resolved by the vendor.
    SecurityError,
    /// Exchange metadata not available for a ticker.
    ExchangeNotFound,
    /// No usable data returned.
    NoData,

    // Session errors
    /// Session failed to start.
    SessionStartFailed,
    /// Vendor service could not be opened.
    ServiceUnavailable,
    /// Event of an unexpected kind was received.
    UnexpectedEvent,
    /// Timed out waiting for an event.
    Timeout,
    /// Transport failure in the session.
    SessionFailure,
}

impl ErrorCode {
    /// Get the error reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidField => "INVALID_FIELD",
            Self::UnsupportedField => "UNSUPPORTED_FIELD",
            Self::SecurityError => "SECURITY_ERROR",
            Self::ExchangeNotFound => "EXCHANGE_NOT_FOUND",
            Self::NoData => "NO_DATA",
            Self::SessionStartFailed => "SESSION_START_FAILED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::UnexpectedEvent => "UNEXPECTED_EVENT",
            Self::Timeout => "TIMEOUT",
            Self::SessionFailure => "SESSION_FAILURE",
        }
    }

    /// Whether the error originates from the session rather than the request.
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::SessionStartFailed
                | Self::ServiceUnavailable
                | Self::UnexpectedEvent
                | Self::Timeout
                | Self::SessionFailure
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// A rich error with context for the terminal bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{}] {message}", code.reason())]
pub struct BridgeError {
    /// Error code.
    code: ErrorCode,
    /// Human-readable message.
    message: String,
    /// Additional context (key-value pairs).
    context: Vec<(String, String)>,
}

/// Result alias used throughout the crate.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

impl BridgeError {
    /// Create a new bridge error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Add context to the error.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Get the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the context.
    #[must_use]
    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Look up a context value by key.
    #[must_use]
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Convenience constructors for common errors.
impl BridgeError {
    /// Invalid request.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Field flagged `INVALID_FIELD` by the vendor.
    #[must_use]
    pub fn invalid_field(field: &str) -> Self {
        Self::new(ErrorCode::InvalidField, format!("{field}: INVALID_FIELD"))
            .with_context("field", field)
    }

    /// Field shape does not match the request kind.
    #[must_use]
    pub fn unsupported_field(field: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedField, message).with_context("field", field)
    }

    /// Security could not be resolved.
    #[must_use]
    pub fn security_error(security: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SecurityError, message).with_context("security", security)
    }

    /// Timed out draining the event queue.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(
            ErrorCode::Timeout,
            "Timeout waiting for response event, increase the session timeout",
        )
    }

    /// Received an event of the wrong kind.
    #[must_use]
    pub fn unexpected_event(expected: &str, received: &str) -> Self {
        Self::new(
            ErrorCode::UnexpectedEvent,
            format!("Expected a {expected} event but received a {received}"),
        )
        .with_context("received", received)
    }

    /// No data for the request.
    #[must_use]
    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoData, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_creation_with_context() {
        let error = BridgeError::new(ErrorCode::InvalidRequest, "Bad request")
            .with_context("field", "PX_LAST")
            .with_context("ticker", "VOD LN EQUITY");

        assert_eq!(error.code(), ErrorCode::InvalidRequest);
        assert_eq!(error.message(), "Bad request");
        assert_eq!(error.context().len(), 2);
        assert_eq!(error.context_value("ticker"), Some("VOD LN EQUITY"));
        assert_eq!(error.context_value("missing"), None);
    }

    #[test]
    fn error_display() {
        let error = BridgeError::invalid_request("Missing field");
        assert_eq!(error.to_string(), "[INVALID_REQUEST] Missing field");
    }

    #[test]
    fn invalid_field_message() {
        let error = BridgeError::invalid_field("PX_LSAT");
        assert_eq!(error.message(), "PX_LSAT: INVALID_FIELD");
        assert_eq!(error.context_value("field"), Some("PX_LSAT"));
    }

    #[test]
    fn session_error_classification() {
        assert!(ErrorCode::Timeout.is_session_error());
        assert!(ErrorCode::UnexpectedEvent.is_session_error());
        assert!(!ErrorCode::InvalidField.is_session_error());
        assert!(!ErrorCode::NoData.is_session_error());
    }
}
