//! Historical Data
//!
//! Request elements for historical requests, parsing of historical
//! responses into long rows, and the wide (date by security/field) layout.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::overrides::{OverrideColumn, OverrideValue, RequestColumns};
use crate::domain::response::{Message, MessagePayload};
use crate::domain::value::FieldValue;
use crate::error::{BridgeError, ErrorCode, Result};

// =============================================================================
// Element names
// =============================================================================

/// `startDate` element.
pub const START_DATE: &str = "startDate";
/// `endDate` element.
pub const END_DATE: &str = "endDate";
/// `periodicitySelection` element.
pub const PERIODICITY: &str = "periodicitySelection";
/// `nonTradingDayFillMethod` element.
pub const FILL_METHOD: &str = "nonTradingDayFillMethod";
/// `adjustmentFollowDPDF` element.
pub const FOLLOW_DPDF: &str = "adjustmentFollowDPDF";
/// `currency` element.
pub const CURRENCY: &str = "currency";
/// `calendarCodeOverride` element.
pub const CALENDAR: &str = "calendarCodeOverride";

// =============================================================================
// Element values
// =============================================================================

/// Sampling periodicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Periodicity {
    /// Every trading day.
    #[default]
    Daily,
    /// Weekly.
    Weekly,
    /// Monthly.
    Monthly,
    /// Twice a year.
    SemiAnnually,
    /// Quarterly.
    Quarterly,
    /// Yearly.
    Yearly,
}

impl Periodicity {
    /// Vendor name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::SemiAnnually => "SEMI_ANNUALLY",
            Self::Quarterly => "QUARTERLY",
            Self::Yearly => "YEARLY",
        }
    }
}

impl FromStr for Periodicity {
    type Err = BridgeError;

    /// Parse a one-letter code (`D`, `W`, `M`, `S`, `Q`, `A`).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "D" => Ok(Self::Daily),
            "W" => Ok(Self::Weekly),
            "M" => Ok(Self::Monthly),
            "S" => Ok(Self::SemiAnnually),
            "Q" => Ok(Self::Quarterly),
            "A" => Ok(Self::Yearly),
            other => Err(BridgeError::invalid_request(format!(
                "Periodicity must be one of D, W, M, S, Q, A, not {other}"
            ))),
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value used on non-trading days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillMethod {
    /// Leave blank (`B`).
    #[default]
    NilValue,
    /// Carry the previous value (`P`).
    PreviousValue,
}

impl FillMethod {
    /// Vendor name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NilValue => "NIL_VALUE",
            Self::PreviousValue => "PREVIOUS_VALUE",
        }
    }
}

impl FromStr for FillMethod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "B" => Ok(Self::NilValue),
            "P" => Ok(Self::PreviousValue),
            _ => Err(BridgeError::invalid_request(format!("Fill must be B or P, not {s}"))),
        }
    }
}

// =============================================================================
// History options
// =============================================================================

/// Per-security options of a historical request.
///
/// Every vector holds either one value (applied to every security) or one
/// value per security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryOptions {
    /// First date.
    pub start_dates: Vec<NaiveDate>,
    /// Last date.
    pub end_dates: Vec<NaiveDate>,
    /// Calendar codes; only sent with daily periodicity.
    pub calendars: Vec<String>,
    /// Currency codes.
    pub currencies: Vec<String>,
    /// Non-trading-day fill.
    pub fill: Vec<FillMethod>,
    /// Follow the user's dividend/split adjustment defaults.
    pub follow_dpdf: Vec<bool>,
    /// Periodicity.
    pub periodicity: Vec<Periodicity>,
}

impl HistoryOptions {
    /// Daily history between two dates for every security.
    #[must_use]
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_dates: vec![start],
            end_dates: vec![end],
            calendars: Vec::new(),
            currencies: Vec::new(),
            fill: vec![FillMethod::NilValue],
            follow_dpdf: vec![true],
            periodicity: vec![Periodicity::Daily],
        }
    }

    /// Set the periodicity for every security.
    #[must_use]
    pub fn with_periodicity(mut self, periodicity: Periodicity) -> Self {
        self.periodicity = vec![periodicity];
        self
    }

    /// Set the fill method for every security.
    #[must_use]
    pub fn with_fill(mut self, fill: FillMethod) -> Self {
        self.fill = vec![fill];
        self
    }

    /// Set the currency for every security.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currencies = vec![currency.into()];
        self
    }

    /// Set the calendar for every security.
    #[must_use]
    pub fn with_calendar(mut self, calendar: impl Into<String>) -> Self {
        self.calendars = vec![calendar.into()];
        self
    }

    /// Whether every security's start date equals its end date.
    #[must_use]
    pub fn is_single_date(&self, securities: usize) -> bool {
        (0..securities.max(1)).all(|row| pick(&self.start_dates, row) == pick(&self.end_dates, row))
    }

    /// Build the element columns for grouping.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when no start or end date is given.
    pub fn to_columns(&self, securities: usize) -> Result<RequestColumns> {
        if self.start_dates.is_empty() || self.end_dates.is_empty() {
            return Err(BridgeError::invalid_request("start and end dates must be non empty"));
        }

        let mut columns = RequestColumns::new()
            .with_element(FILL_METHOD, column(&self.fill, |f| f.as_str().into()))
            .with_element(FOLLOW_DPDF, column(&self.follow_dpdf, |b| (*b).into()));
        if !self.currencies.is_empty() {
            columns = columns.with_element(CURRENCY, column(&self.currencies, |c| c.to_uppercase().into()));
        }
        columns = columns
            .with_element(START_DATE, column(&self.start_dates, |d| (*d).into()))
            .with_element(END_DATE, column(&self.end_dates, |d| (*d).into()))
            .with_element(PERIODICITY, column(&self.periodicity, |p| p.as_str().into()));

        if !self.calendars.is_empty() {
            let rows = securities.max(self.calendars.len()).max(self.periodicity.len());
            let values: Vec<OverrideValue> = (0..rows)
                .map(|row| match (pick(&self.periodicity, row), pick(&self.calendars, row)) {
                    (Some(Periodicity::Daily), Some(code)) => code.to_uppercase().into(),
                    _ => OverrideValue::new(""),
                })
                .collect();
            let values = if values.iter().all(|v| *v == values[0]) {
                OverrideColumn::Scalar(values[0].clone())
            } else {
                OverrideColumn::PerSecurity(values)
            };
            columns = columns.with_element(CALENDAR, values);
        }

        Ok(columns)
    }
}

fn pick<T>(values: &[T], row: usize) -> Option<&T> {
    if values.len() == 1 { values.first() } else { values.get(row) }
}

fn column<T>(values: &[T], render: impl Fn(&T) -> OverrideValue) -> OverrideColumn {
    OverrideColumn::PerSecurity(values.iter().map(render).collect())
}

// =============================================================================
// Parsing
// =============================================================================

/// One (date, security, field, value) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryLongRow {
    /// Observation date.
    pub date: NaiveDate,
    /// Security as echoed by the vendor.
    pub security: String,
    /// Field name.
    pub field: String,
    /// Value.
    pub value: FieldValue,
}

/// Parse historical messages into long rows.
///
/// # Errors
///
/// Returns `SecurityError` if the vendor could not resolve a security and
/// `InvalidField` if it raised any field exception.
pub fn parse_historical(messages: &[Message]) -> Result<Vec<HistoryLongRow>> {
    let mut rows = Vec::new();

    for message in messages {
        let data = match &message.payload {
            MessagePayload::HistoricalData(data) => data,
            other => {
                return Err(BridgeError::new(
                    ErrorCode::UnexpectedEvent,
                    format!("Expected a HistoricalDataResponse but received a {}", other.schema()),
                ));
            }
        };

        if let Some(error) = &data.security_error {
            return Err(BridgeError::security_error(
                &data.security,
                format!("{}: {}", data.security, error.message),
            )
            .with_context("subcategory", &error.subcategory));
        }
        if let Some(exception) = data.field_exceptions.first() {
            return Err(BridgeError::new(
                ErrorCode::InvalidField,
                format!("{}: {}", exception.field_id, exception.error_info.subcategory),
            )
            .with_context("field", &exception.field_id)
            .with_context("security", &data.security));
        }

        for row in &data.field_data {
            for (field, value) in &row.fields {
                if field == "date" {
                    continue;
                }
                rows.push(HistoryLongRow {
                    date: row.date,
                    security: data.security.clone(),
                    field: field.clone(),
                    value: value.clone(),
                });
            }
        }
    }

    Ok(rows)
}

// =============================================================================
// Layouts
// =============================================================================

/// Historical rows aligned to a caller's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    /// Ticker as supplied by the caller.
    pub ticker: String,
    /// Observation date; `None` when the input produced no data.
    pub date: Option<NaiveDate>,
    /// Value.
    pub value: FieldValue,
}

/// Wide table: one row per date, one column per (security, field).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryFrame {
    /// Dates in ascending order.
    pub dates: Vec<NaiveDate>,
    /// (security, field) columns in first-appearance order.
    pub columns: Vec<(String, String)>,
    /// `values[date][column]`.
    pub values: Vec<Vec<FieldValue>>,
}

impl HistoryFrame {
    /// Pivot long rows into a wide table. Gaps are `Null`.
    #[must_use]
    pub fn pivot(rows: &[HistoryLongRow]) -> Self {
        let dates: Vec<NaiveDate> = rows
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let date_index: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut columns: Vec<(String, String)> = Vec::new();
        let mut column_index: BTreeMap<(String, String), usize> = BTreeMap::new();
        for row in rows {
            let key = (row.security.clone(), row.field.clone());
            if !column_index.contains_key(&key) {
                column_index.insert(key.clone(), columns.len());
                columns.push(key);
            }
        }

        let mut values = vec![vec![FieldValue::Null; columns.len()]; dates.len()];
        for row in rows {
            let col = column_index[&(row.security.clone(), row.field.clone())];
            values[date_index[&row.date]][col] = row.value.clone();
        }

        Self {
            dates,
            columns,
            values,
        }
    }

    /// Value at a date for a (security, field) column.
    #[must_use]
    pub fn get(&self, date: NaiveDate, security: &str, field: &str) -> Option<&FieldValue> {
        let row = self.dates.iter().position(|d| *d == date)?;
        let col = self
            .columns
            .iter()
            .position(|(s, f)| s == security && f == field)?;
        self.values.get(row)?.get(col)
    }
}
