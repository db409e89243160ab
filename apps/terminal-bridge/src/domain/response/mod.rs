//! Vendor Event Model
//!
//! Events and messages as delivered by a terminal session. A request is
//! answered by zero or more `PartialResponse` events followed by one
//! `Response` event; every message carries the correlation ids of the
//! request it answers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::ticks::TickType;
use crate::domain::value::FieldValue;

// =============================================================================
// Events
// =============================================================================

/// Kind of an event delivered by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Session lifecycle notification.
    SessionStatus,
    /// Service open notification.
    ServiceStatus,
    /// Final response to a request.
    Response,
    /// Intermediate page of a response.
    PartialResponse,
    /// No event arrived within the timeout.
    Timeout,
    /// Request status notification.
    RequestStatus,
    /// Anything else.
    Other,
}

impl EventKind {
    /// Vendor name of the event kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStatus => "SESSION_STATUS",
            Self::ServiceStatus => "SERVICE_STATUS",
            Self::Response => "RESPONSE",
            Self::PartialResponse => "PARTIAL_RESPONSE",
            Self::Timeout => "TIMEOUT",
            Self::RequestStatus => "REQUEST_STATUS",
            Self::Other => "OTHER",
        }
    }

    /// Whether the event carries response data.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(self, Self::Response | Self::PartialResponse)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Correlation id attached to a request and echoed on its responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a correlation id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<NaiveDate> for CorrelationId {
    fn from(value: NaiveDate) -> Self {
        Self(value.format("%Y%m%d").to_string())
    }
}

/// An event: a kind plus the messages it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind.
    pub kind: EventKind,
    /// Messages in delivery order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Event {
    /// Create an event.
    #[must_use]
    pub const fn new(kind: EventKind, messages: Vec<Message>) -> Self {
        Self { kind, messages }
    }

    /// Status event with a single status message.
    #[must_use]
    pub fn status(kind: EventKind, status: impl Into<String>) -> Self {
        Self::new(kind, vec![Message::new(MessagePayload::Status(status.into()))])
    }

    /// Timeout event.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(EventKind::Timeout, Vec::new())
    }

    /// Final response event.
    #[must_use]
    pub const fn response(messages: Vec<Message>) -> Self {
        Self::new(EventKind::Response, messages)
    }

    /// Partial response event.
    #[must_use]
    pub const fn partial(messages: Vec<Message>) -> Self {
        Self::new(EventKind::PartialResponse, messages)
    }
}

/// A message within an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation ids of the request answered.
    #[serde(default)]
    pub correlation_ids: Vec<CorrelationId>,
    /// Message body.
    pub payload: MessagePayload,
}

impl Message {
    /// Message without correlation ids.
    #[must_use]
    pub const fn new(payload: MessagePayload) -> Self {
        Self {
            correlation_ids: Vec::new(),
            payload,
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
        self.correlation_ids.push(id.into());
        self
    }
}

/// Body of a message, by response schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessagePayload {
    /// `ReferenceDataResponse`.
    ReferenceData(Vec<SecurityData>),
    /// `HistoricalDataResponse`.
    HistoricalData(HistoricalSecurityData),
    /// `IntradayTickResponse`.
    IntradayTicks(Vec<TickData>),
    /// `IntradayBarResponse`.
    IntradayBars(Vec<BarData>),
    /// `InstrumentListResponse`.
    InstrumentList(Vec<InstrumentResult>),
    /// `BeqsResponse`: security names.
    ScreenResults(Vec<String>),
    /// `ExcelGetGridResponse`: data records of string fields.
    GridRecords(Vec<Vec<String>>),
    /// Session, service or request status.
    Status(String),
}

impl MessagePayload {
    /// Schema name of the payload.
    #[must_use]
    pub const fn schema(&self) -> &'static str {
        match self {
            Self::ReferenceData(_) => "ReferenceDataResponse",
            Self::HistoricalData(_) => "HistoricalDataResponse",
            Self::IntradayTicks(_) => "IntradayTickResponse",
            Self::IntradayBars(_) => "IntradayBarResponse",
            Self::InstrumentList(_) => "InstrumentListResponse",
            Self::ScreenResults(_) => "BeqsResponse",
            Self::GridRecords(_) => "ExcelGetGridResponse",
            Self::Status(_) => "Status",
        }
    }
}

// =============================================================================
// Response bodies
// =============================================================================

/// Vendor error details.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error category (`BAD_SEC`, `BAD_FLD`).
    pub category: String,
    /// Error subcategory (`INVALID_SECURITY`, `INVALID_FIELD`).
    pub subcategory: String,
    /// Free-text message.
    #[serde(default)]
    pub message: String,
}

impl ErrorInfo {
    /// Create error details.
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        subcategory: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
            message: message.into(),
        }
    }
}

/// Per-field error on a security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldException {
    /// Field the error applies to.
    pub field_id: String,
    /// Error details.
    pub error_info: ErrorInfo,
}

impl FieldException {
    /// Whether the vendor rejected the field itself.
    #[must_use]
    pub fn is_invalid_field(&self) -> bool {
        self.error_info.subcategory == "INVALID_FIELD"
    }
}

/// Reference data for one security.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SecurityData {
    /// Security as requested.
    pub security: String,
    /// Set when the security could not be resolved.
    #[serde(default)]
    pub security_error: Option<ErrorInfo>,
    /// Field-level errors.
    #[serde(default)]
    pub field_exceptions: Vec<FieldException>,
    /// Field values by field name.
    #[serde(default)]
    pub field_data: BTreeMap<String, FieldValue>,
}

impl SecurityData {
    /// Security data with no fields.
    #[must_use]
    pub fn new(security: impl Into<String>) -> Self {
        Self {
            security: security.into(),
            ..Self::default()
        }
    }

    /// Add a field value.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.field_data.insert(field.into(), value.into());
        self
    }

    /// Mark the security as unresolved.
    #[must_use]
    pub fn with_security_error(mut self, error: ErrorInfo) -> Self {
        self.security_error = Some(error);
        self
    }

    /// Add a field exception.
    #[must_use]
    pub fn with_field_exception(mut self, field: impl Into<String>, error: ErrorInfo) -> Self {
        self.field_exceptions.push(FieldException {
            field_id: field.into(),
            error_info: error,
        });
        self
    }
}

/// Historical values of one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRow {
    /// Observation date.
    pub date: NaiveDate,
    /// Field values on that date.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

/// Historical data for one security.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoricalSecurityData {
    /// Security as requested.
    pub security: String,
    /// Set when the security could not be resolved.
    #[serde(default)]
    pub security_error: Option<ErrorInfo>,
    /// Field-level errors.
    #[serde(default)]
    pub field_exceptions: Vec<FieldException>,
    /// Rows in vendor order.
    #[serde(default)]
    pub field_data: Vec<HistoricalRow>,
}

/// A single intraday tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickData {
    /// Event time (UTC).
    pub time: NaiveDateTime,
    /// Tick type.
    #[serde(rename = "type")]
    pub tick_type: TickType,
    /// Price.
    pub value: f64,
    /// Size.
    #[serde(default)]
    pub size: f64,
    /// Trade condition codes.
    #[serde(default)]
    pub condition_codes: Option<String>,
    /// Exchange code.
    #[serde(default)]
    pub exchange_code: Option<String>,
    /// Reported trade time (UTC), when distinct from the event time.
    #[serde(default)]
    pub trade_time: Option<NaiveDateTime>,
}

/// A single intraday bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarData {
    /// Bar open time (UTC).
    pub time: NaiveDateTime,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    pub volume: i64,
    /// Number of events in the bar.
    pub num_events: i64,
}

/// One result of an instrument search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentResult {
    /// Security in search syntax (`IBM US<equity>`).
    pub security: String,
    /// Description.
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds_classify() {
        assert!(EventKind::Response.is_response());
        assert!(EventKind::PartialResponse.is_response());
        assert!(!EventKind::Timeout.is_response());
        assert_eq!(EventKind::ServiceStatus.to_string(), "SERVICE_STATUS");
    }

    #[test]
    fn field_exception_classification() {
        let data = SecurityData::new("IBM US Equity")
            .with_field_exception("PX_LSAT", ErrorInfo::new("BAD_FLD", "INVALID_FIELD", "Field not valid"))
            .with_field_exception("DVD_HIST", ErrorInfo::new("BAD_FLD", "NOT_APPLICABLE_TO_REF_DATA", ""));
        assert!(data.field_exceptions[0].is_invalid_field());
        assert!(!data.field_exceptions[1].is_invalid_field());
    }

    #[test]
    fn correlation_id_from_date() {
        let date = NaiveDate::from_ymd_opt(2016, 6, 25).unwrap();
        assert_eq!(CorrelationId::from(date).as_str(), "20160625");
    }

    #[test]
    fn message_json_shape() {
        let json = r#"{
            "correlation_ids": ["20160625"],
            "payload": {"type": "reference_data", "data": [
                {"security": "AUD1M CMPN Curncy",
                 "field_data": {"SETTLE_DT": {"type": "text", "value": "20160628"}}}
            ]}
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.correlation_ids, vec![CorrelationId::new("20160625")]);
        let MessagePayload::ReferenceData(rows) = &message.payload else {
            panic!("expected reference data");
        };
        assert_eq!(rows[0].field_data["SETTLE_DT"], FieldValue::from("20160628"));
        assert!(rows[0].security_error.is_none());
    }
}
