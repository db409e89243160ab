//! Portfolio Holdings and Basket Spread
//!
//! Holdings come from a bulk member table with percentage weights. A
//! portfolio can be topped up with a cash line or reweighted to sum to one.
//!
//! The basket spread is the weighted bid/ask spread of the holdings, averaged
//! over a lookback window:
//!
//! 1. Keep holdings with a positive weight and normalise their weights.
//! 2. Renormalise over holdings whose pricing identifier resolved.
//! 3. For each holding and date compute the spread in basis points.
//! 4. Each date's basket value is Σ w·bps / Σ w over holdings quoted that day.
//! 5. The basket spread is the mean of the daily values.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::reconcile::BulkTable;
use crate::domain::statistics::BPS;
use crate::domain::value::FieldValue;
use crate::error::{BridgeError, Result};

/// Ticker of the synthetic cash line.
pub const CASH_POSITION: &str = "Cash Position";
/// Bulk column holding the member ticker.
pub const MEMBER_TICKER_COLUMN: &str = "Member Ticker and Exchange Code";
/// Bulk column holding the percentage weight.
pub const MEMBER_WEIGHT_COLUMN: &str = "Percentage Weight";
/// Field resolving a holding to its priceable identifier.
pub const PARSEKYABLE_FIELD: &str = "PARSEKYABLE_DES_SOURCE";
/// Field giving the pricing source's quote type.
pub const QUOTE_TYPE_FIELD: &str = "PCS_QUOTE_TYP";
/// Override selecting the pricing source.
pub const PRICING_SOURCE_OVERRIDE: &str = "PRICING_SOURCE";

// =============================================================================
// Holdings
// =============================================================================

/// One portfolio line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// Member ticker.
    pub ticker: String,
    /// Weight as a fraction of the portfolio.
    pub weight: Decimal,
}

impl Holding {
    /// Create a holding.
    #[must_use]
    pub fn new(ticker: impl Into<String>, weight: Decimal) -> Self {
        Self {
            ticker: ticker.into(),
            weight,
        }
    }
}

/// How holdings weights are adjusted after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightAdjustment {
    /// Weights as reported.
    #[default]
    None,
    /// Add a cash line absorbing the shortfall from one.
    AddCash,
    /// Scale weights to sum to one.
    Reweight,
}

impl WeightAdjustment {
    /// Resolve the caller's flags.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when both flags are set.
    pub fn from_flags(add_cash: bool, reweight: bool) -> Result<Self> {
        match (add_cash, reweight) {
            (true, true) => Err(BridgeError::invalid_request(
                "Cannot both add cash and reweight portfolio",
            )),
            (true, false) => Ok(Self::AddCash),
            (false, true) => Ok(Self::Reweight),
            (false, false) => Ok(Self::None),
        }
    }
}

/// Holdings of one fund or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Portfolio ticker.
    pub ticker: String,
    /// Holdings in member-table order.
    pub holdings: Vec<Holding>,
}

impl Portfolio {
    /// Create a portfolio.
    #[must_use]
    pub fn new(ticker: impl Into<String>, holdings: Vec<Holding>) -> Self {
        Self {
            ticker: ticker.into(),
            holdings,
        }
    }

    /// Build a portfolio from the rows of a member table belonging to
    /// `ticker`. Percentage weights are divided by 100; rows without a member
    /// ticker or a numeric weight are skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when the table lacks either column.
    pub fn from_bulk(
        ticker: &str,
        table: &BulkTable,
        ticker_column: &str,
        weight_column: &str,
    ) -> Result<Self> {
        let missing = |column: &str| {
            BridgeError::invalid_request(format!("Member table has no column {column}"))
                .with_context("portfolio", ticker)
        };
        let ticker_index = table.column_index(ticker_column).ok_or_else(|| missing(ticker_column))?;
        let weight_index = table.column_index(weight_column).ok_or_else(|| missing(weight_column))?;

        let holdings = table
            .rows
            .iter()
            .filter(|row| row.ticker == ticker && row.position.is_some())
            .filter_map(|row| {
                let member = row.values.get(ticker_index)?.as_str()?;
                let weight = row.values.get(weight_index)?.as_decimal()?;
                Some(Holding::new(member, weight / Decimal::ONE_HUNDRED))
            })
            .collect();

        Ok(Self::new(ticker, holdings))
    }

    /// Sum of all weights.
    #[must_use]
    pub fn total_weight(&self) -> Decimal {
        self.holdings.iter().map(|h| h.weight).sum()
    }

    /// Add a cash line when the weights do not sum to one at three decimal
    /// places.
    #[must_use]
    pub fn with_cash(mut self) -> Self {
        let total = self.total_weight();
        if total.round_dp(3) != Decimal::ONE {
            self.holdings.push(Holding::new(CASH_POSITION, Decimal::ONE - total));
        }
        self
    }

    /// Scale weights to sum to one. A zero total leaves weights untouched.
    #[must_use]
    pub fn reweighted(mut self) -> Self {
        let total = self.total_weight();
        if !total.is_zero() {
            for holding in &mut self.holdings {
                holding.weight /= total;
            }
        }
        self
    }

    /// Apply a weight adjustment.
    #[must_use]
    pub fn adjusted(self, adjustment: WeightAdjustment) -> Self {
        match adjustment {
            WeightAdjustment::None => self,
            WeightAdjustment::AddCash => self.with_cash(),
            WeightAdjustment::Reweight => self.reweighted(),
        }
    }

    /// Weights rescaled over holdings whose identifier resolved.
    ///
    /// `identifiers` is aligned with the holdings; unresolved holdings get
    /// zero.
    #[must_use]
    pub fn valid_reweight(&self, identifiers: &[FieldValue]) -> Vec<Decimal> {
        let resolved = |i: usize| identifiers.get(i).is_some_and(|v| !v.is_security_not_found());
        let total: Decimal = self
            .holdings
            .iter()
            .enumerate()
            .filter(|(i, _)| resolved(*i))
            .map(|(_, h)| h.weight)
            .sum();

        self.holdings
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if resolved(i) {
                    h.weight.checked_div(total).unwrap_or_default()
                } else {
                    Decimal::ZERO
                }
            })
            .collect()
    }
}

// =============================================================================
// Basket Spread
// =============================================================================

/// Pricing convention of a pricing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteType {
    /// Quoted in price.
    Price,
    /// Quoted as a discount.
    Discount,
}

impl QuoteType {
    /// Parse the vendor's quote type code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for codes other than 1 and 2.
    pub fn from_value(value: &FieldValue) -> Result<Self> {
        match value.as_decimal() {
            Some(c) if c == Decimal::ONE => Ok(Self::Price),
            Some(c) if c == Decimal::TWO => Ok(Self::Discount),
            _ => Err(BridgeError::invalid_request(format!(
                "quote type of {value} not yet supported"
            ))),
        }
    }

    /// Bid and ask fields for this convention.
    #[must_use]
    pub const fn fields(self) -> (&'static str, &'static str) {
        match self {
            Self::Price => ("PX_BID", "PX_ASK"),
            Self::Discount => ("PX_DISC_BID", "PX_DISC_ASK"),
        }
    }
}

/// A holding resolved against a pricing source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketMember {
    /// Member ticker from the holdings.
    pub ticker: String,
    /// Priceable identifier, or the sentinel when unresolved.
    pub identifier: FieldValue,
    /// Quote type reported for the identifier.
    pub quote_type: FieldValue,
    /// Weight normalised over positive holdings.
    pub weight: Decimal,
    /// Whether the member is priced.
    pub included: bool,
    /// Weight normalised over included members.
    pub included_weight: Decimal,
}

/// Resolve positive-weight holdings into basket members.
///
/// `identifiers` and `quote_types` are aligned with the positive-weight
/// holdings in order.
#[must_use]
pub fn basket_members(
    holdings: &[Holding],
    identifiers: &[FieldValue],
    quote_types: &[FieldValue],
) -> Vec<BasketMember> {
    let positive: Vec<&Holding> = positive_holdings(holdings).collect();
    let total: Decimal = positive.iter().map(|h| h.weight).sum();

    let mut members: Vec<BasketMember> = positive
        .iter()
        .enumerate()
        .map(|(i, holding)| {
            let identifier = identifiers.get(i).cloned().unwrap_or_default();
            let quote_type = quote_types.get(i).cloned().unwrap_or_default();
            let included = !quote_type.is_missing() && !identifier.is_security_not_found();
            BasketMember {
                ticker: holding.ticker.clone(),
                identifier,
                quote_type,
                weight: holding.weight.checked_div(total).unwrap_or_default(),
                included,
                included_weight: Decimal::ZERO,
            }
        })
        .collect();

    let included_total: Decimal = members.iter().filter(|m| m.included).map(|m| m.weight).sum();
    for member in members.iter_mut().filter(|m| m.included) {
        member.included_weight = member.weight.checked_div(included_total).unwrap_or_default();
    }
    members
}

/// Holdings with a strictly positive weight.
pub fn positive_holdings(holdings: &[Holding]) -> impl Iterator<Item = &Holding> {
    holdings.iter().filter(|h| h.weight > Decimal::ZERO)
}

/// Bid/ask observation of one member on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadObservation {
    /// Priceable identifier.
    pub identifier: String,
    /// Observation date.
    pub date: NaiveDate,
    /// Bid.
    pub bid: Option<Decimal>,
    /// Ask.
    pub ask: Option<Decimal>,
    /// Member weight within the basket.
    pub weight: Decimal,
}

impl SpreadObservation {
    /// Ask minus bid.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.ask? - self.bid?)
    }

    /// Mid price.
    #[must_use]
    pub fn mid(&self) -> Option<Decimal> {
        Some((self.ask? + self.bid?) / Decimal::TWO)
    }

    /// Spread over mid in basis points.
    #[must_use]
    pub fn spread_bps(&self) -> Option<Decimal> {
        Some(self.spread()?.checked_div(self.mid()?)? * BPS)
    }
}

/// Weighted spread of a basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketSpread {
    /// Portfolio ticker.
    pub ticker: String,
    /// Lookback in days.
    pub timeperiod: u32,
    /// Mean of the daily weighted spreads, in basis points.
    pub spread_bps: Option<Decimal>,
    /// Weighted spread per date.
    pub daily: BTreeMap<NaiveDate, Decimal>,
    /// Members and their weights.
    pub members: Vec<BasketMember>,
    /// Observations behind the calculation.
    pub observations: Vec<SpreadObservation>,
}

/// Weighted spread per date: Σ w·bps / Σ w over members with a spread.
#[must_use]
pub fn daily_spreads(observations: &[SpreadObservation]) -> BTreeMap<NaiveDate, Decimal> {
    let mut sums: BTreeMap<NaiveDate, (Decimal, Decimal)> = BTreeMap::new();
    for observation in observations {
        if let Some(bps) = observation.spread_bps() {
            let entry = sums.entry(observation.date).or_default();
            entry.0 += observation.weight * bps;
            entry.1 += observation.weight;
        }
    }
    sums.into_iter()
        .filter_map(|(date, (weighted, weight))| Some((date, weighted.checked_div(weight)?)))
        .collect()
}

/// Mean of the daily weighted spreads.
#[must_use]
pub fn basket_spread(daily: &BTreeMap<NaiveDate, Decimal>) -> Option<Decimal> {
    let count = Decimal::from(daily.len());
    daily.values().copied().sum::<Decimal>().checked_div(count)
}
