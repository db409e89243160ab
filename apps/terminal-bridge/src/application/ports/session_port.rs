//! Session Port (Driven Port)
//!
//! Interface to a market data terminal session: services are opened, typed
//! requests are sent and decoded events are pulled off the session queue.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::overrides::OverrideValue;
use crate::domain::response::{CorrelationId, Event};
use crate::domain::security::SecurityId;
use crate::domain::ticks::{TickOptions, TickType};
use crate::error::{BridgeError, ErrorCode};

// =============================================================================
// Services
// =============================================================================

/// Vendor services used by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    /// Reference, historical and intraday data.
    ReferenceData,
    /// Spreadsheet grid searches.
    ExcelService,
    /// Instrument lookup.
    Instruments,
}

impl Service {
    /// Services opened at start-up, in order.
    pub const ALL: [Self; 3] = [Self::ReferenceData, Self::ExcelService, Self::Instruments];

    /// Service URI.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::ReferenceData => "//blp/refdata",
            Self::ExcelService => "//blp/exrsvc",
            Self::Instruments => "//blp/instruments",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Named request element or override, rendered as a string.
pub type NamedValue = (String, OverrideValue);

/// Screen type of an equity screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreenType {
    /// User-defined screen.
    #[default]
    Private,
    /// Vendor-provided screen.
    Global,
}

impl ScreenType {
    /// Vendor spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "PRIVATE",
            Self::Global => "GLOBAL",
        }
    }
}

/// A typed vendor request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum Request {
    /// Point-in-time reference data.
    ReferenceData {
        /// Securities in request order.
        securities: Vec<SecurityId>,
        /// Fields in request order.
        fields: Vec<String>,
        /// Field overrides.
        overrides: Vec<NamedValue>,
    },
    /// Historical end-of-day data.
    HistoricalData {
        /// Securities in request order.
        securities: Vec<SecurityId>,
        /// Fields in request order.
        fields: Vec<String>,
        /// Request elements (dates, periodicity, fill).
        elements: Vec<NamedValue>,
        /// Field overrides.
        overrides: Vec<NamedValue>,
    },
    /// Raw intraday ticks for one security.
    IntradayTick {
        /// Security.
        security: SecurityId,
        /// Tick types to return.
        event_types: Vec<TickType>,
        /// Start of the window.
        start: DateTime<Utc>,
        /// End of the window.
        end: DateTime<Utc>,
        /// Optional attributes.
        options: TickOptions,
    },
    /// Intraday bars for one security.
    IntradayBar {
        /// Security.
        security: SecurityId,
        /// Tick type the bars are built from.
        event_type: TickType,
        /// Bar length in minutes.
        interval: u32,
        /// Start of the window.
        start: DateTime<Utc>,
        /// End of the window.
        end: DateTime<Utc>,
        /// Extra request elements.
        elements: Vec<NamedValue>,
    },
    /// Instrument search.
    InstrumentList {
        /// Free-text query.
        query: String,
        /// Result cap.
        max_results: Option<u32>,
        /// Yellow-key filter, e.g. `EQTY`.
        yellow_key_filter: Option<String>,
    },
    /// Equity screen.
    Beqs {
        /// Screen name.
        screen_name: String,
        /// Screen type.
        screen_type: ScreenType,
        /// Language of the screen.
        language_id: Option<String>,
        /// Screen folder.
        group: Option<String>,
        /// Overrides such as the point-in-time date.
        overrides: Vec<NamedValue>,
    },
    /// Grid search, e.g. `COMDTY:NGFLOW`.
    ExcelGetGrid {
        /// Search domain.
        domain: String,
    },
}

impl Request {
    /// Vendor request name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReferenceData { .. } => "ReferenceDataRequest",
            Self::HistoricalData { .. } => "HistoricalDataRequest",
            Self::IntradayTick { .. } => "IntradayTickRequest",
            Self::IntradayBar { .. } => "IntradayBarRequest",
            Self::InstrumentList { .. } => "instrumentListRequest",
            Self::Beqs { .. } => "BeqsRequest",
            Self::ExcelGetGrid { .. } => "ExcelGetGridRequest",
        }
    }

    /// Service the request is sent to.
    #[must_use]
    pub const fn service(&self) -> Service {
        match self {
            Self::InstrumentList { .. } => Service::Instruments,
            Self::ExcelGetGrid { .. } => Service::ExcelService,
            _ => Service::ReferenceData,
        }
    }

    /// Securities named by the request.
    #[must_use]
    pub fn securities(&self) -> Vec<&SecurityId> {
        match self {
            Self::ReferenceData { securities, .. } | Self::HistoricalData { securities, .. } => {
                securities.iter().collect()
            }
            Self::IntradayTick { security, .. } | Self::IntradayBar { security, .. } => {
                vec![security]
            }
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// Session options and errors
// =============================================================================

/// Connection settings handed to a session implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Terminal host.
    pub host: String,
    /// Terminal port.
    pub port: u16,
    /// Event wait timeout.
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8194,
            timeout: Duration::from_millis(50_000),
        }
    }
}

/// Session port error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Transport failure.
    #[error("Session connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// Service not opened.
    #[error("Service not open: {service}")]
    ServiceNotOpen {
        /// Service URI.
        service: String,
    },

    /// Request rejected before sending.
    #[error("Request rejected: {reason}")]
    RequestRejected {
        /// Rejection reason.
        reason: String,
    },

    /// Session already stopped.
    #[error("Session stopped")]
    Stopped,

    /// Unknown error.
    #[error("Session error: {message}")]
    Unknown {
        /// Error details.
        message: String,
    },
}

impl From<SessionError> for BridgeError {
    fn from(error: SessionError) -> Self {
        let code = match &error {
            SessionError::ServiceNotOpen { .. } => ErrorCode::ServiceUnavailable,
            SessionError::RequestRejected { .. } => ErrorCode::InvalidRequest,
            SessionError::ConnectionError { .. }
            | SessionError::Stopped
            | SessionError::Unknown { .. } => ErrorCode::SessionFailure,
        };
        Self::new(code, error.to_string())
    }
}

// =============================================================================
// Port
// =============================================================================

/// Port for terminal session interactions.
#[async_trait]
pub trait SessionPort: Send + Sync {
    /// Start the session. Returns `false` when the session could not start.
    async fn start(&self) -> Result<bool, SessionError>;

    /// Open a service. Returns `false` when the service is unavailable.
    async fn open_service(&self, service: Service) -> Result<bool, SessionError>;

    /// Send a request, tagging responses with `correlation_id` when given.
    async fn send_request(
        &self,
        request: Request,
        correlation_id: Option<CorrelationId>,
    ) -> Result<(), SessionError>;

    /// Wait up to `timeout` for the next event. An empty wait yields a
    /// `Timeout` event.
    async fn next_event(&self, timeout: Duration) -> Result<Event, SessionError>;

    /// Pop a queued event without waiting.
    fn try_next_event(&self) -> Option<Event>;

    /// Stop the session.
    async fn stop(&self) -> Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_route_to_services() {
        let grid = Request::ExcelGetGrid {
            domain: "COMDTY:NGFLOW".into(),
        };
        assert_eq!(grid.service(), Service::ExcelService);
        assert_eq!(grid.name(), "ExcelGetGridRequest");

        let search = Request::InstrumentList {
            query: "IBM".into(),
            max_results: Some(10),
            yellow_key_filter: None,
        };
        assert_eq!(search.service().uri(), "//blp/instruments");

        let reference = Request::ReferenceData {
            securities: vec![SecurityId::new("IBM US EQUITY")],
            fields: vec!["PX_LAST".into()],
            overrides: Vec::new(),
        };
        assert_eq!(reference.service(), Service::ReferenceData);
        assert_eq!(reference.securities().len(), 1);
    }

    #[test]
    fn session_errors_map_to_codes() {
        let err: BridgeError = SessionError::ServiceNotOpen {
            service: "//blp/refdata".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);

        let err: BridgeError = SessionError::Stopped.into();
        assert_eq!(err.code(), ErrorCode::SessionFailure);
        assert_eq!(err.message(), "Session stopped");
    }

    #[test]
    fn request_serializes_with_tag() {
        let request = Request::ExcelGetGrid {
            domain: "COMDTY:NGFLOW".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["request"], "excel_get_grid");
    }
}
