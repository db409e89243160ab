//! Reference Data Use Case
//!
//! Point-in-time ("BDP") and interval ("BDI") values for a list of tickers.
//! Tickers are normalised, grouped by override combination and sent as one
//! request per group; each input row then picks up its value through the
//! group it belongs to.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::application::ports::SessionPort;
use crate::application::services::Connection;
use crate::domain::overrides::{OverrideColumn, RequestColumns, group_requests};
use crate::domain::reconcile::AlignedResults;
use crate::domain::security::{SecurityId, normalize_all};
use crate::domain::value::FieldValue;
use crate::error::{BridgeError, Result};
use crate::infrastructure::metrics;

/// Field whose interval statistic is computed.
pub const MARKET_DATA_OVERRIDE: &str = "MARKET_DATA_OVERRIDE";
/// First date of an interval statistic.
pub const START_DATE_OVERRIDE: &str = "START_DATE_OVERRIDE";
/// Last date of an interval statistic.
pub const END_DATE_OVERRIDE: &str = "END_DATE_OVERRIDE";

/// One input row of a point-in-time table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRow {
    /// Ticker as supplied by the caller.
    pub ticker: String,
    /// One value per requested field.
    pub values: Vec<FieldValue>,
}

/// Point-in-time values aligned to the caller's tickers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointTable {
    /// Requested fields, in request order.
    pub fields: Vec<String>,
    /// One row per input ticker, in input order.
    pub rows: Vec<PointRow>,
}

impl PointTable {
    /// Values of one field, one per input row.
    #[must_use]
    pub fn column(&self, field: &str) -> Option<Vec<FieldValue>> {
        let index = self.fields.iter().position(|f| f.eq_ignore_ascii_case(field))?;
        Some(
            self.rows
                .iter()
                .map(|row| row.values.get(index).cloned().unwrap_or_default())
                .collect(),
        )
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Use case for point-in-time reference data.
pub struct ReferenceDataUseCase<S>
where
    S: SessionPort,
{
    connection: Arc<Connection<S>>,
}

impl<S> Clone for ReferenceDataUseCase<S>
where
    S: SessionPort,
{
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
        }
    }
}

impl<S> ReferenceDataUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `ReferenceDataUseCase`.
    pub const fn new(connection: Arc<Connection<S>>) -> Self {
        Self { connection }
    }

    /// Fetch `fields` for every ticker.
    ///
    /// Unknown securities carry the unresolved-security sentinel, absent
    /// fields and securities the vendor omitted carry `Null`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty field list or mismatched
    /// override columns, `InvalidField` when the vendor rejects a field, and
    /// propagates session errors.
    pub async fn execute<T: AsRef<str>>(
        &self,
        tickers: &[T],
        fields: &[String],
        overrides: &RequestColumns,
    ) -> Result<PointTable> {
        self.fetch(tickers, fields, overrides, "bdp").await
    }

    /// Fetch a single field: one value per ticker.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn field<T: AsRef<str>>(
        &self,
        tickers: &[T],
        field: &str,
        overrides: &RequestColumns,
    ) -> Result<Vec<FieldValue>> {
        let fields = [field.to_string()];
        let table = self.fetch(tickers, &fields, overrides, "bdp").await?;
        Ok(first_values(table))
    }

    /// Interval statistic of `field` between two dates, e.g. the `AVG` of
    /// `PX_VOLUME`. Missing values are replaced by `fill`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty aggregation; otherwise see
    /// [`Self::execute`].
    #[allow(clippy::too_many_arguments)]
    pub async fn interval<T: AsRef<str>>(
        &self,
        tickers: &[T],
        field: &str,
        aggregation: &str,
        start: NaiveDate,
        end: NaiveDate,
        overrides: &RequestColumns,
        fill: FieldValue,
    ) -> Result<Vec<FieldValue>> {
        let aggregation = aggregation.trim().to_uppercase();
        if aggregation.is_empty() {
            return Err(BridgeError::invalid_request("aggregation must be non empty"));
        }

        let mut columns = RequestColumns::new()
            .with_override(MARKET_DATA_OVERRIDE, OverrideColumn::scalar(field))
            .with_override(START_DATE_OVERRIDE, OverrideColumn::scalar(start))
            .with_override(END_DATE_OVERRIDE, OverrideColumn::scalar(end));
        for column in overrides.columns() {
            columns.push(column.name.clone(), column.role, column.values.clone());
        }

        let fields = [format!("INTERVAL_{aggregation}")];
        let table = self.fetch(tickers, &fields, &columns, "bdi").await?;
        Ok(first_values(table)
            .into_iter()
            .map(|value| if value.is_null() { fill.clone() } else { value })
            .collect())
    }

    async fn fetch<T: AsRef<str>>(
        &self,
        tickers: &[T],
        fields: &[String],
        overrides: &RequestColumns,
        call: &'static str,
    ) -> Result<PointTable> {
        if fields.is_empty() {
            return Err(BridgeError::invalid_request("fields must be non empty"));
        }

        let securities = normalize_all(tickers);
        let groups = group_requests(&securities, overrides)?;
        tracing::debug!(
            call,
            tickers = tickers.len(),
            groups = groups.len(),
            "Sending reference requests"
        );

        let mut results: AlignedResults<HashMap<String, FieldValue>> = AlignedResults::new();
        for group in &groups {
            let rows = self
                .connection
                .reference(&group.securities, fields, &group.overrides)
                .await?;
            for row in rows {
                results
                    .entry_or_default(SecurityId::new(row.security), group.key.clone())
                    .entry(row.field)
                    .or_insert(row.value);
            }
        }
        metrics::record_round_trips(call, groups.len());

        let rows = tickers
            .iter()
            .zip(results.align(&securities, &groups))
            .map(|(ticker, found)| PointRow {
                ticker: ticker.as_ref().to_string(),
                values: fields
                    .iter()
                    .map(|field| {
                        found
                            .as_ref()
                            .and_then(|values| values.get(field))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect(),
            })
            .collect();

        Ok(PointTable {
            fields: fields.to_vec(),
            rows,
        })
    }
}

fn first_values(table: PointTable) -> Vec<FieldValue> {
    table
        .rows
        .into_iter()
        .map(|row| row.values.into_iter().next().unwrap_or_default())
        .collect()
}
