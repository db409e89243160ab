//! Override Grouping
//!
//! Splits a request's securities into groups that share one distinct
//! combination of field overrides and request elements. Each group becomes
//! exactly one vendor round-trip.
//!
//! Columns are either broadcast to every security ([`OverrideColumn::Scalar`])
//! or given one value per security ([`OverrideColumn::PerSecurity`]).

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::security::SecurityId;
use crate::error::{BridgeError, Result};

// =============================================================================
// Values
// =============================================================================

/// A string-rendered override or element value.
///
/// Dates render as `YYYYMMDD`, booleans as `true`/`false`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideValue(String);

impl OverrideValue {
    /// Create from an already-rendered string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the rendered value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverrideValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OverrideValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OverrideValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<NaiveDate> for OverrideValue {
    fn from(value: NaiveDate) -> Self {
        Self(value.format("%Y%m%d").to_string())
    }
}

impl From<bool> for OverrideValue {
    fn from(value: bool) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for OverrideValue {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<Decimal> for OverrideValue {
    fn from(value: Decimal) -> Self {
        Self(value.normalize().to_string())
    }
}

// =============================================================================
// Columns
// =============================================================================

/// Values of one override or element across the request's securities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideColumn {
    /// One value applied to every security.
    Scalar(OverrideValue),
    /// One value per security, in input order.
    PerSecurity(Vec<OverrideValue>),
}

impl OverrideColumn {
    /// Broadcast a single value.
    #[must_use]
    pub fn scalar(value: impl Into<OverrideValue>) -> Self {
        Self::Scalar(value.into())
    }

    /// One value per security.
    #[must_use]
    pub fn per_security<V: Into<OverrideValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::PerSecurity(values.into_iter().map(Into::into).collect())
    }

    /// Element columns broadcast a single-value vector; override columns
    /// must match the security count exactly.
    fn expand(&self, name: &str, role: ColumnRole, rows: usize) -> Result<Vec<OverrideValue>> {
        match self {
            Self::Scalar(value) => Ok(vec![value.clone(); rows]),
            Self::PerSecurity(values) if values.len() == rows => Ok(values.clone()),
            Self::PerSecurity(values) if values.len() == 1 && role == ColumnRole::Element => {
                Ok(vec![values[0].clone(); rows])
            }
            Self::PerSecurity(_) => Err(BridgeError::invalid_request(format!(
                "Invalid number of overrides specified for {name}"
            ))
            .with_context("override", name)),
        }
    }
}

/// Whether a column is sent as a field override or a request element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    /// `overrides` entry (`fieldId`/`value`).
    Override,
    /// Top-level request element (periodicity, fill, currency).
    Element,
}

/// A named column of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestColumn {
    /// Vendor name of the override or element.
    pub name: String,
    /// How the column is sent.
    pub role: ColumnRole,
    /// Column values.
    pub values: OverrideColumn,
}

/// Ordered set of override and element columns for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestColumns {
    columns: Vec<RequestColumn>,
}

impl RequestColumns {
    /// Empty column set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Add a field override column.
    #[must_use]
    pub fn with_override(mut self, name: impl Into<String>, values: OverrideColumn) -> Self {
        self.push(name, ColumnRole::Override, values);
        self
    }

    /// Add a request element column.
    #[must_use]
    pub fn with_element(mut self, name: impl Into<String>, values: OverrideColumn) -> Self {
        self.push(name, ColumnRole::Element, values);
        self
    }

    /// Add a column in place.
    pub fn push(&mut self, name: impl Into<String>, role: ColumnRole, values: OverrideColumn) {
        self.columns.push(RequestColumn {
            name: name.into(),
            role,
            values,
        });
    }

    /// Columns in insertion order.
    #[must_use]
    pub fn columns(&self) -> &[RequestColumn] {
        &self.columns
    }

    /// Whether there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// =============================================================================
// Groups
// =============================================================================

/// One value per column, in column order.
pub type GroupKey = Vec<OverrideValue>;

/// Securities sharing one override/element combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestGroup {
    /// Column values shared by the group.
    pub key: GroupKey,
    /// Field overrides to send.
    pub overrides: Vec<(String, OverrideValue)>,
    /// Request elements to send.
    pub elements: Vec<(String, OverrideValue)>,
    /// Unique securities in first-appearance order.
    pub securities: Vec<SecurityId>,
    /// Input row indices mapped to this group.
    pub rows: Vec<usize>,
}

impl RequestGroup {
    /// Value of a named element, if the group carries it.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<&OverrideValue> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Group securities by their distinct override/element combination.
///
/// Groups are returned in first-appearance order.
///
/// # Errors
///
/// Returns `InvalidRequest` if a per-security column length does not match
/// the number of securities.
pub fn group_requests(
    securities: &[SecurityId],
    columns: &RequestColumns,
) -> Result<Vec<RequestGroup>> {
    let rows = securities.len();
    let expanded = columns
        .columns()
        .iter()
        .map(|column| column.values.expand(&column.name, column.role, rows))
        .collect::<Result<Vec<_>>>()?;

    let mut groups: Vec<RequestGroup> = Vec::new();
    let mut members: Vec<HashSet<SecurityId>> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for (row, security) in securities.iter().enumerate() {
        let key: GroupKey = expanded.iter().map(|values| values[row].clone()).collect();

        let slot = if let Some(&slot) = index.get(&key) {
            slot
        } else {
            let (overrides, elements) = split_roles(columns, &key);
            groups.push(RequestGroup {
                key: key.clone(),
                overrides,
                elements,
                securities: Vec::new(),
                rows: Vec::new(),
            });
            members.push(HashSet::new());
            index.insert(key, groups.len() - 1);
            groups.len() - 1
        };

        groups[slot].rows.push(row);
        if members[slot].insert(security.clone()) {
            groups[slot].securities.push(security.clone());
        }
    }

    Ok(groups)
}

type Assignments = Vec<(String, OverrideValue)>;

fn split_roles(columns: &RequestColumns, key: &GroupKey) -> (Assignments, Assignments) {
    let mut overrides = Vec::new();
    let mut elements = Vec::new();
    for (column, value) in columns.columns().iter().zip(key) {
        let entry = (column.name.clone(), value.clone());
        match column.role {
            ColumnRole::Override => overrides.push(entry),
            ColumnRole::Element => elements.push(entry),
        }
    }
    (overrides, elements)
}
