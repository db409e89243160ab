//! Field Values
//!
//! Scalar and bulk values returned by the vendor for a (security, field)
//! pair, plus the null conventions used in reconciled output.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Value placed in every cell belonging to a security the vendor could not
/// resolve.
pub const SECURITY_NOT_FOUND: &str = "security not found";

/// A single value for a (security, field) pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Field absent or not applicable.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time (vendor times are UTC).
    DateTime(NaiveDateTime),
    /// Array of sub-rows (bulk reference data).
    Bulk(Vec<BulkRow>),
}

impl FieldValue {
    /// The sentinel value for an unresolved security.
    #[must_use]
    pub fn security_not_found() -> Self {
        Self::Text(SECURITY_NOT_FOUND.to_string())
    }

    /// Whether the value is null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value is the unresolved-security sentinel.
    #[must_use]
    pub fn is_security_not_found(&self) -> bool {
        matches!(self, Self::Text(s) if s == SECURITY_NOT_FOUND)
    }

    /// Whether the value holds neither data nor the sentinel.
    ///
    /// Used when a caller wants to know if anything usable came back.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.is_null() || self.is_security_not_found()
    }

    /// Whether the value is bulk data.
    #[must_use]
    pub const fn is_bulk(&self) -> bool {
        matches!(self, Self::Bulk(_))
    }

    /// Numeric view of the value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) if v.is_finite() => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Decimal view of the value.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Int(v) => Some(Decimal::from(*v)),
            Self::Float(v) => Decimal::try_from(*v).ok(),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String view of the value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Bulk rows, if the value is bulk data.
    #[must_use]
    pub fn as_bulk(&self) -> Option<&[BulkRow]> {
        match self {
            Self::Bulk(rows) => Some(rows),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, ""),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Self::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.3f")),
            Self::Bulk(rows) => write!(f, "[{} rows]", rows.len()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// One element of a bulk field: named scalar values in vendor order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkRow {
    /// (element name, value) pairs.
    pub elements: Vec<(String, FieldValue)>,
}

impl BulkRow {
    /// Create a bulk row from name/value pairs.
    #[must_use]
    pub fn new<N: Into<String>>(elements: impl IntoIterator<Item = (N, FieldValue)>) -> Self {
        Self {
            elements: elements.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    /// Get an element by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.elements.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}
