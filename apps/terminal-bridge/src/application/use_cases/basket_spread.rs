//! Basket Spread Use Case
//!
//! Weighted bid/ask spread of a fund's holdings over a lookback window
//! ending yesterday. Holdings are resolved to priceable identifiers under a
//! pricing source, grouped by quote convention, and priced with one history
//! request per convention.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;

use crate::application::ports::SessionPort;
use crate::application::services::Connection;
use crate::domain::history::HistoryOptions;
use crate::domain::overrides::{OverrideColumn, RequestColumns};
use crate::domain::portfolio::{
    BasketMember, BasketSpread, PARSEKYABLE_FIELD, PRICING_SOURCE_OVERRIDE, QUOTE_TYPE_FIELD,
    QuoteType, SpreadObservation, basket_members, basket_spread, daily_spreads, positive_holdings,
};
use crate::domain::security::normalize;
use crate::domain::value::FieldValue;
use crate::error::{BridgeError, Result};

use super::historical::HistoricalDataUseCase;
use super::portfolio::{DEFAULT_MEMBER_FIELD, PortfolioUseCase};
use super::reference::ReferenceDataUseCase;

/// Use case computing a basket's weighted spread.
pub struct BasketSpreadUseCase<S>
where
    S: SessionPort,
{
    reference: ReferenceDataUseCase<S>,
    history: HistoricalDataUseCase<S>,
    portfolios: PortfolioUseCase<S>,
}

impl<S> BasketSpreadUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `BasketSpreadUseCase`.
    pub fn new(connection: Arc<Connection<S>>) -> Self {
        Self {
            reference: ReferenceDataUseCase::new(Arc::clone(&connection)),
            history: HistoricalDataUseCase::new(Arc::clone(&connection)),
            portfolios: PortfolioUseCase::new(connection),
        }
    }

    /// Spread of `ticker`'s basket priced at `pricing_source` over the
    /// `timeperiod` days before `today`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a zero lookback or an unsupported quote
    /// type, `NoData` when the basket has no positive holdings, and
    /// propagates session errors.
    pub async fn execute(
        &self,
        ticker: &str,
        pricing_source: &str,
        timeperiod: u32,
        today: NaiveDate,
    ) -> Result<BasketSpread> {
        if timeperiod == 0 {
            return Err(BridgeError::invalid_request("timeperiod must be positive"));
        }
        let start = today
            .checked_sub_days(Days::new(u64::from(timeperiod)))
            .ok_or_else(|| BridgeError::invalid_request("lookback starts before the calendar"))?;
        let end = today
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| BridgeError::invalid_request("lookback starts before the calendar"))?;

        let portfolio = self.portfolios.portfolio(ticker, DEFAULT_MEMBER_FIELD).await?;
        let positive: Vec<&str> = positive_holdings(&portfolio.holdings)
            .map(|h| h.ticker.as_str())
            .collect();
        if positive.is_empty() {
            return Err(BridgeError::no_data(format!("No positive holdings for {ticker}")));
        }

        let members = self.resolve(&portfolio.holdings, &positive, pricing_source).await?;
        for member in members.iter().filter(|m| !m.included) {
            tracing::debug!(ticker = %member.ticker, identifier = %member.identifier, "Member not priced");
        }

        let mut observations = Vec::new();
        for (quote_type, weights) in quote_groups(&members)? {
            observations.extend(self.price(quote_type, &weights, start, end).await?);
        }

        let daily = daily_spreads(&observations);
        let spread_bps = basket_spread(&daily);
        tracing::info!(ticker, timeperiod, spread_bps = ?spread_bps, "Basket spread computed");

        Ok(BasketSpread {
            ticker: ticker.to_string(),
            timeperiod,
            spread_bps,
            daily,
            members,
            observations,
        })
    }

    async fn resolve(
        &self,
        holdings: &[crate::domain::portfolio::Holding],
        positive: &[&str],
        pricing_source: &str,
    ) -> Result<Vec<BasketMember>> {
        let pricing = RequestColumns::new()
            .with_override(PRICING_SOURCE_OVERRIDE, OverrideColumn::scalar(pricing_source));
        let identifiers = self.reference.field(positive, PARSEKYABLE_FIELD, &pricing).await?;

        let priceable: Vec<&str> = identifiers.iter().filter_map(priceable_identifier).collect();
        let mut found = if priceable.is_empty() {
            Vec::new()
        } else {
            self.reference
                .field(&priceable, QUOTE_TYPE_FIELD, &RequestColumns::new())
                .await?
        }
        .into_iter();

        let quote_types: Vec<FieldValue> = identifiers
            .iter()
            .map(|identifier| {
                if priceable_identifier(identifier).is_some() {
                    found.next().unwrap_or_default()
                } else if identifier.is_security_not_found() {
                    identifier.clone()
                } else {
                    FieldValue::Null
                }
            })
            .collect();

        Ok(basket_members(holdings, &identifiers, &quote_types))
    }

    async fn price(
        &self,
        quote_type: QuoteType,
        weights: &[(String, Decimal)],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SpreadObservation>> {
        let (bid, ask) = quote_type.fields();
        let identifiers: Vec<&str> = weights.iter().map(|(id, _)| id.as_str()).collect();
        let frame = self
            .history
            .frame(
                &identifiers,
                &[bid.to_string(), ask.to_string()],
                &HistoryOptions::between(start, end),
                &RequestColumns::new(),
            )
            .await?;

        let mut observations = Vec::new();
        for &date in &frame.dates {
            for (identifier, weight) in weights {
                let security = normalize(identifier);
                let value = |field| {
                    frame
                        .get(date, security.as_str(), field)
                        .and_then(FieldValue::as_decimal)
                };
                let (bid, ask) = (value(bid), value(ask));
                if bid.is_none() && ask.is_none() {
                    continue;
                }
                observations.push(SpreadObservation {
                    identifier: identifier.clone(),
                    date,
                    bid,
                    ask,
                    weight: *weight,
                });
            }
        }
        Ok(observations)
    }
}

fn priceable_identifier(value: &FieldValue) -> Option<&str> {
    if value.is_missing() {
        return None;
    }
    value.as_str().filter(|id| !id.trim().is_empty())
}

/// Included members grouped by quote convention in first-appearance order,
/// with weights summed per identifier.
fn quote_groups(members: &[BasketMember]) -> Result<Vec<(QuoteType, Vec<(String, Decimal)>)>> {
    let mut groups: Vec<(QuoteType, Vec<(String, Decimal)>)> = Vec::new();

    for member in members.iter().filter(|m| m.included) {
        let Some(identifier) = member.identifier.as_str() else {
            continue;
        };
        let quote_type = QuoteType::from_value(&member.quote_type)?;
        let index = groups.iter().position(|(q, _)| *q == quote_type).unwrap_or_else(|| {
            groups.push((quote_type, Vec::new()));
            groups.len() - 1
        });
        let weights = &mut groups[index].1;
        match weights.iter_mut().find(|(id, _)| id == identifier) {
            Some((_, weight)) => *weight += member.included_weight,
            None => weights.push((identifier.to_string(), member.included_weight)),
        }
    }
    Ok(groups)
}
