//! Bulk Data Use Case
//!
//! Array-valued reference fields ("BDS") such as index members or dividend
//! histories, pivoted into one row per (ticker, field, position).

use std::sync::Arc;

use crate::application::ports::SessionPort;
use crate::application::services::Connection;
use crate::domain::overrides::{RequestColumns, group_requests};
use crate::domain::reconcile::{AlignedResults, BulkReferenceRow, BulkTable};
use crate::domain::security::{SecurityId, normalize_all};
use crate::error::{BridgeError, Result};
use crate::infrastructure::metrics;

/// Use case for bulk reference data.
pub struct BulkDataUseCase<S>
where
    S: SessionPort,
{
    connection: Arc<Connection<S>>,
}

impl<S> Clone for BulkDataUseCase<S>
where
    S: SessionPort,
{
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
        }
    }
}

impl<S> BulkDataUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `BulkDataUseCase`.
    pub const fn new(connection: Arc<Connection<S>>) -> Self {
        Self { connection }
    }

    /// Fetch bulk `fields` for every ticker.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty field list or mismatched
    /// override columns, `UnsupportedField` when a field is scalar, and
    /// propagates session errors.
    pub async fn execute<T: AsRef<str>>(
        &self,
        tickers: &[T],
        fields: &[String],
        overrides: &RequestColumns,
    ) -> Result<BulkTable> {
        if fields.is_empty() {
            return Err(BridgeError::invalid_request("fields must be non empty"));
        }

        let securities = normalize_all(tickers);
        let groups = group_requests(&securities, overrides)?;

        let mut results: AlignedResults<Vec<BulkReferenceRow>> = AlignedResults::new();
        for group in &groups {
            let rows = self
                .connection
                .bulk_reference(&group.securities, fields, &group.overrides)
                .await?;
            for row in rows {
                results
                    .entry_or_default(SecurityId::new(row.security.clone()), group.key.clone())
                    .push(row);
            }
        }
        metrics::record_round_trips("bds", groups.len());

        let aligned = results.align(&securities, &groups);
        Ok(BulkTable::assemble(tickers, fields, &aligned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::testing::{connect, override_value, reference_responder};
    use crate::domain::overrides::OverrideColumn;
    use crate::domain::response::{ErrorInfo, SecurityData};
    use crate::domain::value::{BulkRow, FieldValue};
    use crate::error::ErrorCode;

    fn dividends(security: &str, fields: &[String], overrides: &[crate::application::ports::NamedValue]) -> Option<SecurityData> {
        let amount = if override_value(overrides, "DVD_CRNCY") == Some("USD") { 1.2 } else { 1.0 };
        match security {
            "IBM US EQUITY" => {
                let mut data = SecurityData::new(security);
                for field in fields {
                    let value = if field == "DVD_HIST" {
                        FieldValue::Bulk(vec![
                            BulkRow::new([
                                ("Declared Date", FieldValue::from("2024-01-30")),
                                ("Dividend Amount", FieldValue::from(amount)),
                            ]),
                            BulkRow::new([
                                ("Declared Date", FieldValue::from("2023-10-31")),
                                ("Dividend Amount", FieldValue::from(amount)),
                            ]),
                        ])
                    } else {
                        FieldValue::from("International Business Machines")
                    };
                    data = data.with_field(field.clone(), value);
                }
                Some(data)
            }
            "BAD US EQUITY" => Some(SecurityData::new(security).with_security_error(ErrorInfo::new(
                "BAD_SEC",
                "INVALID_SECURITY",
                "Unknown/Invalid security",
            ))),
            _ => None,
        }
    }

    #[tokio::test]
    async fn rows_follow_input_order() {
        let (session, connection) = connect(reference_responder(dividends)).await;
        let use_case = BulkDataUseCase::new(connection);

        let table = use_case
            .execute(
                &["BAD US Equity", "IBM US Equity", "NONE US Equity", "ibm us equity"],
                &["DVD_HIST".to_string()],
                &RequestColumns::new(),
            )
            .await
            .unwrap();

        assert_eq!(table.columns, vec!["Declared Date", "Dividend Amount"]);
        assert_eq!(table.rows.len(), 6);
        assert_eq!(table.rows[0].values, vec![FieldValue::security_not_found(); 2]);
        assert_eq!(table.rows[1].ticker, "IBM US Equity");
        assert_eq!(table.rows[2].position, Some(1));
        assert_eq!(table.rows[3].values, vec![FieldValue::Null, FieldValue::Null]);
        assert_eq!(table.rows[5].ticker, "ibm us equity");
        assert_eq!(table.rows[5].location, 3);
        assert_eq!(session.sent_requests().len(), 1);
    }

    #[tokio::test]
    async fn overrides_reach_their_rows() {
        let (session, connection) = connect(reference_responder(dividends)).await;
        let use_case = BulkDataUseCase::new(connection);

        let overrides = RequestColumns::new()
            .with_override("DVD_CRNCY", OverrideColumn::per_security(["USD", "EUR"]));
        let table = use_case
            .execute(&["IBM US Equity", "IBM US Equity"], &["DVD_HIST".to_string()], &overrides)
            .await
            .unwrap();

        let amounts = table.column("Dividend Amount").unwrap();
        assert_eq!(amounts[0], &FieldValue::Float(1.2));
        assert_eq!(amounts[2], &FieldValue::Float(1.0));
        assert_eq!(session.sent_requests().len(), 2);
    }

    #[tokio::test]
    async fn scalar_field_rejected() {
        let (_, connection) = connect(reference_responder(dividends)).await;
        let use_case = BulkDataUseCase::new(connection);
        let err = use_case
            .execute(&["IBM US Equity"], &["NAME".to_string()], &RequestColumns::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedField);
    }
}
