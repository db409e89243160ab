//! Holders Use Case
//!
//! Public-filing holders of a security ("HDS"). Two bulk fields are joined on
//! (ticker, holder id, portfolio number): the detailed filings list and the
//! holders' cost basis. Each holding is then valued at the fund's USD NAV and
//! expressed as a share of the class assets.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::SessionPort;
use crate::application::services::Connection;
use crate::domain::overrides::{OverrideColumn, RequestColumns};
use crate::domain::reconcile::{BulkTable, BulkTableRow};
use crate::domain::value::FieldValue;
use crate::error::{BridgeError, Result};

use super::bulk::BulkDataUseCase;
use super::reference::ReferenceDataUseCase;

/// Bulk field listing holders from public filings.
pub const FILINGS_FIELD: &str = "ALL_HOLDERS_PUB_FILINGS_WITH_TKR";
/// Bulk field listing holders' cost basis.
pub const COST_BASIS_FIELD: &str = "ALL_HOLDERS_COST_BASIS";
/// Override selecting the filings view.
pub const FILINGS_VIEW_OVERRIDE: &str = "ALL_HLDRS_PUB_FILINGS_VIEW_OVR";
/// One row per holder and portfolio.
pub const DETAILED_VIEW: &str = "DETAILED_MULTI";

const NAV_FIELD: &str = "FUND_NET_ASSET_VAL";
const NAV_CURRENCY_OVERRIDE: &str = "NAV_CRNCY";
const CLASS_ASSETS_FIELD: &str = "FUND_CRNCY_ADJ_CLASS_ASSETS";
const CLASS_ASSETS_CURRENCY_OVERRIDE: &str = "FUND_CLASS_ASSETS_CRNCY";
const USD: &str = "USD";

const HOLDER_ID: &str = "holder_id";
const PORTFOLIO_NUMBER: &str = "portfolio_number";
const POSITION: &str = "position";

/// Filing columns not carried into the result.
const DROPPED_FILING_COLUMNS: [&str; 2] = ["percent_outstanding", "market_value"];
/// Cost basis columns already present in the filings.
const DROPPED_COST_COLUMNS: [&str; 5] = [
    "position",
    "filing_date",
    "holder_name",
    "institution_type",
    "portfolio_name",
];

/// One holder of one input ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderRow {
    /// Ticker as supplied by the caller.
    pub ticker: String,
    /// Input position.
    pub location: usize,
    /// Holder identifier; the missing marker when the input had no data.
    pub holder_id: FieldValue,
    /// Portfolio number within the holder.
    pub portfolio_number: FieldValue,
    /// Shares held.
    pub shares_held: Option<Decimal>,
    /// Remaining filing and cost basis columns, snake-cased.
    pub details: BTreeMap<String, FieldValue>,
    /// Fund NAV in USD.
    pub nav: Option<Decimal>,
    /// Position value in USD.
    pub position_usd: Option<Decimal>,
    /// Share class assets in USD.
    pub share_class_aum: Option<Decimal>,
    /// Position value as a fraction of the class assets.
    pub pcn_of_aum: Option<Decimal>,
}

/// Use case for security holders.
pub struct HoldersUseCase<S>
where
    S: SessionPort,
{
    reference: ReferenceDataUseCase<S>,
    bulk: BulkDataUseCase<S>,
}

impl<S> HoldersUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `HoldersUseCase`.
    pub fn new(connection: Arc<Connection<S>>) -> Self {
        Self {
            reference: ReferenceDataUseCase::new(Arc::clone(&connection)),
            bulk: BulkDataUseCase::new(connection),
        }
    }

    /// Holders of every ticker, in input order then filing order.
    ///
    /// Inputs without filings keep one row carrying the missing marker.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedField` if either holder field comes back scalar,
    /// `InvalidRequest` if the filings lack the join columns, and propagates
    /// session errors.
    pub async fn execute<T: AsRef<str>>(&self, tickers: &[T]) -> Result<Vec<HolderRow>> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }
        let view = RequestColumns::new()
            .with_override(FILINGS_VIEW_OVERRIDE, OverrideColumn::scalar(DETAILED_VIEW));

        let filings = self
            .bulk
            .execute(tickers, &[FILINGS_FIELD.to_string()], &view)
            .await?;
        let costs = self
            .bulk
            .execute(tickers, &[COST_BASIS_FIELD.to_string()], &view)
            .await?;

        let navs = self
            .usd_values(tickers, NAV_FIELD, NAV_CURRENCY_OVERRIDE)
            .await?;
        let assets = self
            .usd_values(tickers, CLASS_ASSETS_FIELD, CLASS_ASSETS_CURRENCY_OVERRIDE)
            .await?;

        let filing_columns = snake_columns(&filings);
        let cost_columns = snake_columns(&costs);
        if filings.rows.iter().any(|r| r.position.is_some())
            && !(filing_columns.iter().any(|c| c == HOLDER_ID)
                && filing_columns.iter().any(|c| c == PORTFOLIO_NUMBER))
        {
            return Err(BridgeError::invalid_request(format!(
                "{FILINGS_FIELD} is missing the {HOLDER_ID} or {PORTFOLIO_NUMBER} column"
            )));
        }
        let cost_index = index_costs(&costs, &cost_columns);

        let rows: Vec<HolderRow> = filings
            .rows
            .iter()
            .map(|row| {
                let nav = navs.get(row.location).copied().flatten();
                let aum = assets
                    .get(row.location)
                    .copied()
                    .flatten()
                    .and_then(|millions| millions.checked_mul(Decimal::from(1_000_000)));
                holder_row(row, &filing_columns, &cost_columns, &cost_index, nav, aum)
            })
            .collect();

        tracing::debug!(tickers = tickers.len(), holders = rows.len(), "Holders assembled");
        Ok(rows)
    }

    async fn usd_values<T: AsRef<str>>(
        &self,
        tickers: &[T],
        field: &str,
        currency_override: &str,
    ) -> Result<Vec<Option<Decimal>>> {
        let overrides =
            RequestColumns::new().with_override(currency_override, OverrideColumn::scalar(USD));
        let values = self.reference.field(tickers, field, &overrides).await?;
        Ok(values.iter().map(FieldValue::as_decimal).collect())
    }
}

type CostKey = (usize, String, String);

fn holder_row(
    row: &BulkTableRow,
    filing_columns: &[String],
    cost_columns: &[String],
    costs: &HashMap<CostKey, &BulkTableRow>,
    nav: Option<Decimal>,
    aum: Option<Decimal>,
) -> HolderRow {
    let value = |name: &str| {
        filing_columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| row.values.get(i))
            .cloned()
    };

    if row.position.is_none() {
        let marker = row.values.first().cloned().unwrap_or_default();
        return HolderRow {
            ticker: row.ticker.clone(),
            location: row.location,
            holder_id: marker.clone(),
            portfolio_number: marker,
            shares_held: None,
            details: BTreeMap::new(),
            nav,
            position_usd: None,
            share_class_aum: aum,
            pcn_of_aum: None,
        };
    }

    let holder_id = value(HOLDER_ID).unwrap_or_default();
    let portfolio_number = value(PORTFOLIO_NUMBER).unwrap_or_default();
    let shares_held = value(POSITION).as_ref().and_then(FieldValue::as_decimal);

    let mut details = BTreeMap::new();
    for (name, value) in filing_columns.iter().zip(&row.values) {
        if [HOLDER_ID, PORTFOLIO_NUMBER, POSITION].contains(&name.as_str())
            || DROPPED_FILING_COLUMNS.contains(&name.as_str())
        {
            continue;
        }
        let name = if name == "ticker" { "client_ticker" } else { name.as_str() };
        details.insert(name.to_string(), value.clone());
    }

    let cost = join_key(row.location, &holder_id, &portfolio_number).and_then(|key| costs.get(&key));
    if let Some(cost) = cost {
        for (name, value) in cost_columns.iter().zip(&cost.values) {
            if [HOLDER_ID, PORTFOLIO_NUMBER, "ticker"].contains(&name.as_str())
                || DROPPED_COST_COLUMNS.contains(&name.as_str())
            {
                continue;
            }
            details.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }

    let position_usd = nav.zip(shares_held).and_then(|(nav, shares)| nav.checked_mul(shares));
    let pcn_of_aum = position_usd
        .zip(aum)
        .and_then(|(position, aum)| position.checked_div(aum));

    HolderRow {
        ticker: row.ticker.clone(),
        location: row.location,
        holder_id,
        portfolio_number,
        shares_held,
        details,
        nav,
        position_usd,
        share_class_aum: aum,
        pcn_of_aum,
    }
}

/// Cost basis rows by (input position, holder id, portfolio number). The
/// first row wins when the vendor repeats a key.
fn index_costs<'a>(costs: &'a BulkTable, columns: &[String]) -> HashMap<CostKey, &'a BulkTableRow> {
    let holder = columns.iter().position(|c| c == HOLDER_ID);
    let portfolio = columns.iter().position(|c| c == PORTFOLIO_NUMBER);
    let (Some(holder), Some(portfolio)) = (holder, portfolio) else {
        return HashMap::new();
    };

    let mut index = HashMap::new();
    for row in costs.rows.iter().filter(|r| r.position.is_some()) {
        let (Some(holder_id), Some(portfolio_number)) = (row.values.get(holder), row.values.get(portfolio)) else {
            continue;
        };
        let Some(key) = join_key(row.location, holder_id, portfolio_number) else {
            continue;
        };
        if index.contains_key(&key) {
            tracing::warn!(ticker = %row.ticker, holder = %key.1, portfolio = %key.2, "Repeated cost basis row");
            continue;
        }
        index.insert(key, row);
    }
    index
}

fn join_key(location: usize, holder_id: &FieldValue, portfolio_number: &FieldValue) -> Option<CostKey> {
    Some((location, key_text(holder_id)?, key_text(portfolio_number)?))
}

/// Identifiers come back as text or numbers depending on the field.
fn key_text(value: &FieldValue) -> Option<String> {
    if value.is_missing() {
        return None;
    }
    value
        .as_decimal()
        .map(|d| d.normalize().to_string())
        .or_else(|| value.as_str().map(|s| s.trim().to_string()))
}

/// Element names as `snake_case`: `Holder Id` becomes `holder_id`.
fn snake_columns(table: &BulkTable) -> Vec<String> {
    table
        .columns
        .iter()
        .map(|c| c.trim().replace(' ', "_").to_lowercase())
        .collect()
}
