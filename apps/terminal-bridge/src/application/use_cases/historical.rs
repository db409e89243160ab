//! Historical Data Use Case
//!
//! Time series ("BDH") for a list of tickers. Request elements (dates,
//! periodicity, fill, currency, calendar) may vary per ticker, so they are
//! grouped together with the field overrides and each distinct combination
//! costs one round-trip.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::ports::SessionPort;
use crate::application::services::Connection;
use crate::domain::history::{HistoryFrame, HistoryLongRow, HistoryOptions, HistoryRow};
use crate::domain::overrides::{RequestColumns, RequestGroup, group_requests};
use crate::domain::reconcile::AlignedResults;
use crate::domain::security::{SecurityId, normalize_all};
use crate::domain::value::FieldValue;
use crate::error::{BridgeError, Result};
use crate::infrastructure::metrics;

/// Shape of a single-field history result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryOutput {
    /// Start and end date coincide for every ticker: one value per ticker.
    Point(Vec<FieldValue>),
    /// One row per (ticker, date), in input order. A ticker without data
    /// contributes one dateless `Null` row.
    Series(Vec<HistoryRow>),
}

/// Use case for historical time series.
pub struct HistoricalDataUseCase<S>
where
    S: SessionPort,
{
    connection: Arc<Connection<S>>,
}

impl<S> HistoricalDataUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `HistoricalDataUseCase`.
    pub const fn new(connection: Arc<Connection<S>>) -> Self {
        Self { connection }
    }

    /// History of one field aligned to `tickers`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for missing dates or mismatched columns,
    /// `SecurityError` or `InvalidField` when the vendor flags the request,
    /// and propagates session errors.
    pub async fn execute<T: AsRef<str>>(
        &self,
        tickers: &[T],
        field: &str,
        options: &HistoryOptions,
        overrides: &RequestColumns,
    ) -> Result<HistoryOutput> {
        let securities = normalize_all(tickers);
        let groups = history_groups(&securities, options, overrides)?;
        let fields = [field.to_string()];

        let mut results: AlignedResults<Vec<(chrono::NaiveDate, FieldValue)>> =
            AlignedResults::new();
        for group in &groups {
            for row in self.fetch(group, &fields).await? {
                if row.field == field {
                    results
                        .entry_or_default(SecurityId::new(row.security), group.key.clone())
                        .push((row.date, row.value));
                }
            }
        }
        metrics::record_round_trips("bdh", groups.len());

        let aligned = results.align(&securities, &groups);

        if options.is_single_date(tickers.len()) {
            return Ok(HistoryOutput::Point(
                aligned
                    .into_iter()
                    .map(|found| {
                        found
                            .and_then(|values| values.into_iter().next())
                            .map(|(_, value)| value)
                            .unwrap_or_default()
                    })
                    .collect(),
            ));
        }

        let mut rows = Vec::new();
        for (ticker, found) in tickers.iter().zip(aligned) {
            let ticker = ticker.as_ref();
            match found {
                Some(values) if !values.is_empty() => {
                    rows.extend(values.into_iter().map(|(date, value)| HistoryRow {
                        ticker: ticker.to_string(),
                        date: Some(date),
                        value,
                    }));
                }
                _ => {
                    tracing::debug!(ticker, field, "No history returned");
                    rows.push(HistoryRow {
                        ticker: ticker.to_string(),
                        date: None,
                        value: FieldValue::Null,
                    });
                }
            }
        }
        Ok(HistoryOutput::Series(rows))
    }

    /// History of several fields pivoted to one row per date with a
    /// column per (security, field).
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty field list; otherwise see
    /// [`Self::execute`].
    pub async fn frame<T: AsRef<str>>(
        &self,
        tickers: &[T],
        fields: &[String],
        options: &HistoryOptions,
        overrides: &RequestColumns,
    ) -> Result<HistoryFrame> {
        if fields.is_empty() {
            return Err(BridgeError::invalid_request("fields must be non empty"));
        }
        let securities = normalize_all(tickers);
        let groups = history_groups(&securities, options, overrides)?;

        let mut rows = Vec::new();
        for group in &groups {
            rows.extend(self.fetch(group, fields).await?);
        }
        metrics::record_round_trips("bdh", groups.len());

        Ok(HistoryFrame::pivot(&rows))
    }

    async fn fetch(&self, group: &RequestGroup, fields: &[String]) -> Result<Vec<HistoryLongRow>> {
        self.connection
            .historical(&group.securities, fields, &group.elements, &group.overrides)
            .await
    }
}

fn history_groups(
    securities: &[SecurityId],
    options: &HistoryOptions,
    overrides: &RequestColumns,
) -> Result<Vec<RequestGroup>> {
    let mut columns = overrides.clone();
    for column in options.to_columns(securities.len())?.columns() {
        columns.push(column.name.clone(), column.role, column.values.clone());
    }
    group_requests(securities, &columns)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::application::ports::Request;
    use crate::application::use_cases::testing::{connect, override_value};
    use crate::domain::history::{END_DATE, PERIODICITY, Periodicity, START_DATE};
    use crate::domain::overrides::OverrideColumn;
    use crate::domain::response::{
        ErrorInfo, Event, HistoricalRow, HistoricalSecurityData, Message, MessagePayload,
    };
    use crate::error::ErrorCode;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Answers every security with one row per day between the requested
    /// dates, valued `day of month * multiplier`.
    fn history_responder(request: &Request, _: Option<&crate::domain::response::CorrelationId>) -> Vec<Event> {
        let Request::HistoricalData {
            securities,
            fields,
            elements,
            ..
        } = request
        else {
            return vec![Event::response(Vec::new())];
        };
        let parse = |name| {
            NaiveDate::parse_from_str(override_value(elements, name).unwrap_or_default(), "%Y%m%d").ok()
        };
        let (Some(start), Some(end)) = (parse(START_DATE), parse(END_DATE)) else {
            return vec![Event::response(Vec::new())];
        };
        let multiplier = if override_value(elements, PERIODICITY) == Some("WEEKLY") { 100 } else { 1 };

        let messages = securities
            .iter()
            .filter(|s| s.as_str() != "EMPTY LN EQUITY")
            .map(|security| {
                if security.as_str() == "BAD LN EQUITY" {
                    return Message::new(MessagePayload::HistoricalData(HistoricalSecurityData {
                        security: security.to_string(),
                        security_error: Some(ErrorInfo::new("BAD_SEC", "INVALID_SECURITY", "Unknown")),
                        ..HistoricalSecurityData::default()
                    }));
                }
                let field_data = start
                    .iter_days()
                    .take_while(|d| *d <= end)
                    .map(|d| {
                        let day = i64::from(chrono::Datelike::day(&d));
                        let values: BTreeMap<String, FieldValue> = fields
                            .iter()
                            .map(|f| (f.clone(), FieldValue::Int(day * multiplier)))
                            .collect();
                        HistoricalRow { date: d, fields: values }
                    })
                    .collect();
                Message::new(MessagePayload::HistoricalData(HistoricalSecurityData {
                    security: security.to_string(),
                    field_data,
                    ..HistoricalSecurityData::default()
                }))
            })
            .collect();
        vec![Event::response(messages)]
    }

    #[tokio::test]
    async fn series_keeps_input_order_and_fills_missing() {
        let (session, connection) = connect(history_responder).await;
        let use_case = HistoricalDataUseCase::new(connection);

        let options = HistoryOptions::between(date(2024, 1, 2), date(2024, 1, 3));
        let output = use_case
            .execute(&["JPST LN Equity", "EMPTY LN Equity", "jpst ln equity"], "PX_LAST", &options, &RequestColumns::new())
            .await
            .unwrap();

        let HistoryOutput::Series(rows) = output else {
            panic!("expected a series");
        };
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].ticker, "JPST LN Equity");
        assert_eq!(rows[0].date, Some(date(2024, 1, 2)));
        assert_eq!(rows[1].value, FieldValue::Int(3));
        assert_eq!(rows[2].ticker, "EMPTY LN Equity");
        assert_eq!(rows[2].date, None);
        assert!(rows[2].value.is_null());
        assert_eq!(rows[4].ticker, "jpst ln equity");
        assert_eq!(session.sent_requests().len(), 1);
    }

    #[tokio::test]
    async fn single_date_returns_points() {
        let (_, connection) = connect(history_responder).await;
        let use_case = HistoricalDataUseCase::new(connection);

        let mut options = HistoryOptions::between(date(2024, 1, 5), date(2024, 1, 5));
        options.start_dates = vec![date(2024, 1, 5), date(2024, 1, 9)];
        options.end_dates = vec![date(2024, 1, 5), date(2024, 1, 9)];
        let output = use_case
            .execute(&["A LN Equity", "B LN Equity", "EMPTY LN Equity"], "PX_LAST", &options, &RequestColumns::new())
            .await
            .unwrap_err();
        assert_eq!(output.code(), ErrorCode::InvalidRequest);

        options.start_dates.push(date(2024, 1, 7));
        options.end_dates.push(date(2024, 1, 7));
        let output = use_case
            .execute(&["A LN Equity", "B LN Equity", "EMPTY LN Equity"], "PX_LAST", &options, &RequestColumns::new())
            .await
            .unwrap();
        assert_eq!(
            output,
            HistoryOutput::Point(vec![FieldValue::Int(5), FieldValue::Int(9), FieldValue::Null])
        );
    }

    #[tokio::test]
    async fn per_ticker_elements_split_requests() {
        let (session, connection) = connect(history_responder).await;
        let use_case = HistoricalDataUseCase::new(connection);

        let mut options = HistoryOptions::between(date(2024, 1, 1), date(2024, 1, 1));
        options.end_dates = vec![date(2024, 1, 2)];
        options.periodicity = vec![Periodicity::Daily, Periodicity::Weekly];
        let overrides = RequestColumns::new()
            .with_override("EQY_FUND_CRNCY", OverrideColumn::scalar("USD"));
        let output = use_case
            .execute(&["A LN Equity", "B LN Equity"], "PX_LAST", &options, &overrides)
            .await
            .unwrap();

        let HistoryOutput::Series(rows) = output else {
            panic!("expected a series");
        };
        assert_eq!(rows.iter().filter(|r| r.ticker == "A LN Equity").count(), 2);
        assert_eq!(rows[2].value, FieldValue::Int(100));

        let sent = session.sent_requests();
        assert_eq!(sent.len(), 2);
        let Request::HistoricalData { overrides, .. } = &sent[0].0 else {
            panic!("expected a historical request");
        };
        assert_eq!(override_value(overrides, "EQY_FUND_CRNCY"), Some("USD"));
    }

    #[tokio::test]
    async fn security_error_propagates() {
        let (_, connection) = connect(history_responder).await;
        let use_case = HistoricalDataUseCase::new(connection);
        let options = HistoryOptions::between(date(2024, 1, 2), date(2024, 1, 3));
        let err = use_case
            .execute(&["BAD LN Equity"], "PX_LAST", &options, &RequestColumns::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SecurityError);
    }

    #[tokio::test]
    async fn frame_pivots_fields() {
        let (_, connection) = connect(history_responder).await;
        let use_case = HistoricalDataUseCase::new(connection);
        let options = HistoryOptions::between(date(2024, 1, 2), date(2024, 1, 4));
        let frame = use_case
            .frame(
                &["A LN Equity"],
                &["PX_LAST".to_string(), "PX_VOLUME".to_string()],
                &options,
                &RequestColumns::new(),
            )
            .await
            .unwrap();
        assert_eq!(frame.dates.len(), 3);
        assert_eq!(
            frame.get(date(2024, 1, 4), "A LN EQUITY", "PX_VOLUME"),
            Some(&FieldValue::Int(4))
        );
    }
}
