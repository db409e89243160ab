//! Portfolio Membership Use Case
//!
//! Fund and index holdings ("MEMB") read from a bulk member table, with
//! optional cash padding, reweighting and reweighting over the members a
//! pricing lookup can resolve.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::SessionPort;
use crate::application::services::Connection;
use crate::domain::overrides::RequestColumns;
use crate::domain::portfolio::{
    MEMBER_TICKER_COLUMN, MEMBER_WEIGHT_COLUMN, PARSEKYABLE_FIELD, Portfolio, WeightAdjustment,
};
use crate::domain::value::FieldValue;
use crate::error::{BridgeError, Result};

use super::bulk::BulkDataUseCase;
use super::reference::ReferenceDataUseCase;

/// Bulk field listing members with their percentage weights.
pub const DEFAULT_MEMBER_FIELD: &str = "INDX_MWEIGHT";

/// Options of a membership query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipOptions {
    /// Bulk field holding the member table.
    pub member_field: String,
    /// Pad each portfolio with a cash line up to a total weight of one.
    pub add_cash: bool,
    /// Report weights scaled to sum to one.
    pub reweight: bool,
    /// Report weights scaled over members whose identifier resolves.
    pub valid_reweight: bool,
}

impl Default for MembershipOptions {
    fn default() -> Self {
        Self {
            member_field: DEFAULT_MEMBER_FIELD.to_string(),
            add_cash: false,
            reweight: false,
            valid_reweight: false,
        }
    }
}

/// One holding of one portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRow {
    /// Portfolio as supplied by the caller.
    pub portfolio_ticker: String,
    /// Member ticker.
    pub ticker: String,
    /// Position in the member table; `None` for an added cash line.
    pub position: Option<usize>,
    /// Weight as a fraction.
    pub weight: Decimal,
    /// Weight scaled to sum to one, when requested.
    pub reweight: Option<Decimal>,
    /// Resolved identifier, when valid reweighting was requested.
    pub identifier: Option<FieldValue>,
    /// Weight scaled over resolved members, when requested.
    pub valid_reweight: Option<Decimal>,
}

/// Use case for portfolio holdings.
pub struct PortfolioUseCase<S>
where
    S: SessionPort,
{
    reference: ReferenceDataUseCase<S>,
    bulk: BulkDataUseCase<S>,
}

impl<S> PortfolioUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `PortfolioUseCase`.
    pub fn new(connection: Arc<Connection<S>>) -> Self {
        Self {
            reference: ReferenceDataUseCase::new(Arc::clone(&connection)),
            bulk: BulkDataUseCase::new(connection),
        }
    }

    /// Holdings of each distinct portfolio, weights as fractions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when two tickers differ only in case or
    /// spacing, or when the member table lacks its ticker or weight column;
    /// otherwise propagates session errors.
    pub async fn portfolios<T: AsRef<str>>(
        &self,
        tickers: &[T],
        member_field: &str,
    ) -> Result<Vec<Portfolio>> {
        let tickers = unique_tickers(tickers)?;
        if tickers.is_empty() {
            return Ok(Vec::new());
        }
        let table = self
            .bulk
            .execute(&tickers, &[member_field.to_string()], &RequestColumns::new())
            .await?;
        tickers
            .iter()
            .map(|ticker| {
                Portfolio::from_bulk(ticker, &table, MEMBER_TICKER_COLUMN, MEMBER_WEIGHT_COLUMN)
            })
            .collect()
    }

    /// Holdings of one portfolio.
    ///
    /// # Errors
    ///
    /// See [`Self::portfolios`].
    pub async fn portfolio(&self, ticker: &str, member_field: &str) -> Result<Portfolio> {
        self.portfolios(&[ticker], member_field)
            .await?
            .pop()
            .ok_or_else(|| BridgeError::no_data(format!("No holdings found for {ticker}")))
    }

    /// Member rows of every portfolio.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when both cash padding and reweighting are
    /// requested; otherwise see [`Self::portfolios`].
    pub async fn members<T: AsRef<str>>(
        &self,
        tickers: &[T],
        options: &MembershipOptions,
    ) -> Result<Vec<MemberRow>> {
        let adjustment = WeightAdjustment::from_flags(options.add_cash, options.reweight)?;
        let portfolios = self.portfolios(tickers, &options.member_field).await?;

        let mut plans = Vec::with_capacity(portfolios.len());
        for portfolio in portfolios {
            let reported = portfolio.holdings.len();
            let portfolio = match adjustment {
                WeightAdjustment::AddCash => portfolio.adjusted(adjustment),
                _ => portfolio,
            };
            let reweighted = (adjustment == WeightAdjustment::Reweight)
                .then(|| portfolio.clone().reweighted());
            plans.push((portfolio, reweighted, reported));
        }

        let identifiers = if options.valid_reweight {
            let members: Vec<&str> = plans
                .iter()
                .flat_map(|(portfolio, _, _)| portfolio.holdings.iter().map(|h| h.ticker.as_str()))
                .collect();
            Some(
                self.reference
                    .field(&members, PARSEKYABLE_FIELD, &RequestColumns::new())
                    .await?,
            )
        } else {
            None
        };

        let mut rows = Vec::new();
        let mut offset = 0;
        for (portfolio, reweighted, reported) in plans {
            let count = portfolio.holdings.len();
            let resolved = identifiers
                .as_ref()
                .map(|all| all[offset..offset + count].to_vec());
            offset += count;

            let valid = resolved.as_ref().map(|ids| {
                reweighted
                    .as_ref()
                    .unwrap_or(&portfolio)
                    .valid_reweight(ids)
            });

            for (i, holding) in portfolio.holdings.iter().enumerate() {
                rows.push(MemberRow {
                    portfolio_ticker: portfolio.ticker.clone(),
                    ticker: holding.ticker.clone(),
                    position: (i < reported).then_some(i),
                    weight: holding.weight,
                    reweight: reweighted.as_ref().map(|p| p.holdings[i].weight),
                    identifier: resolved.as_ref().map(|ids| ids[i].clone()),
                    valid_reweight: valid.as_ref().map(|weights| weights[i]),
                });
            }
        }
        Ok(rows)
    }
}

/// Distinct tickers in first-appearance order.
fn unique_tickers<T: AsRef<str>>(tickers: &[T]) -> Result<Vec<String>> {
    let mut exact = HashSet::new();
    let mut folded = HashSet::new();
    let mut unique = Vec::new();
    for ticker in tickers.iter().map(AsRef::as_ref) {
        if !exact.insert(ticker) {
            continue;
        }
        if !folded.insert(ticker.trim().to_lowercase()) {
            return Err(BridgeError::invalid_request("Duplicate securities in query")
                .with_context("ticker", ticker));
        }
        unique.push(ticker.to_string());
    }
    Ok(unique)
}
