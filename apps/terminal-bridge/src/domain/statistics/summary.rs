//! Session summary statistics.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::timeline::{BPS, QuoteRow};

/// Time- and volume-weighted levels of a reference series (iNAV or fair
/// value).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferenceSummary {
    /// Time-weighted level.
    pub twa: Option<Decimal>,
    /// Volume-weighted level.
    pub vwa: Option<Decimal>,
    /// Time-weighted premium of mid to the reference, in basis points.
    pub twa_premium_bps: Option<Decimal>,
}

/// Summary of one security's trading day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Ticker as supplied by the caller.
    pub ticker: String,
    /// Local trading date.
    pub date: NaiveDate,
    /// Shares traded.
    pub share_volume: Decimal,
    /// Traded value.
    pub turnover: Decimal,
    /// Number of rows with a positive trade size.
    pub trade_count: usize,
    /// Largest single trade size.
    pub largest_block: Option<Decimal>,
    /// Largest trade size valued at the day's vwap.
    pub largest_block_value: Option<Decimal>,
    /// Time-weighted spread.
    pub twa_spread_bps: Option<Decimal>,
    /// Volume-weighted spread.
    pub vwa_spread_bps: Option<Decimal>,
    /// Share of the session with a two-sided quote.
    pub presence: Option<Decimal>,
    /// Volume-weighted trade price.
    pub vwap: Option<Decimal>,
    /// Volume-weighted bid.
    pub vwa_bid: Option<Decimal>,
    /// Volume-weighted ask.
    pub vwa_ask: Option<Decimal>,
    /// Volume-weighted mid.
    pub vwa_mid: Option<Decimal>,
    /// Time-weighted bid.
    pub twa_bid: Option<Decimal>,
    /// Time-weighted ask.
    pub twa_ask: Option<Decimal>,
    /// Time-weighted mid.
    pub twa_mid: Option<Decimal>,
    /// iNAV levels, when requested.
    pub inav: Option<ReferenceSummary>,
    /// Fair value levels, when requested.
    pub fair_value: Option<ReferenceSummary>,
    /// Time-weighted fair value over iNAV, in basis points.
    pub twa_fv_vs_inav_bps: Option<Decimal>,
    /// Volume-weighted fair value over iNAV, in basis points.
    pub vwa_fv_vs_inav_bps: Option<Decimal>,
}

type Column = fn(&QuoteRow) -> Option<Decimal>;

/// Summarise a quote timeline.
#[must_use]
pub fn summarize(
    ticker: &str,
    date: NaiveDate,
    rows: &[QuoteRow],
    with_inav: bool,
    with_fair_value: bool,
) -> SessionSummary {
    let weights = Weights::new(rows);

    let sizes: Vec<Decimal> = rows.iter().map(|r| r.trade_size.unwrap_or_default()).collect();
    let prices: Vec<Decimal> = rows.iter().map(|r| r.trade_price.unwrap_or_default()).collect();
    let share_volume: Decimal = sizes.iter().sum();
    let turnover: Decimal = sizes.iter().zip(&prices).map(|(s, p)| s * p).sum();
    let trade_count = sizes.iter().filter(|s| **s > Decimal::ZERO).count();
    let largest_block = rows.iter().filter_map(|r| r.trade_size).max();
    let vwap = turnover.checked_div(share_volume);

    let volume_weighted = |column: Column| -> Option<Decimal> {
        let filled = fill_both_ways(rows, column);
        let mut total = Decimal::ZERO;
        for (size, value) in sizes.iter().zip(filled) {
            total += size * value?;
        }
        total.checked_div(share_volume)
    };

    let reference = |level: Column, premium: Column| ReferenceSummary {
        twa: weights.time_weighted(rows, level),
        vwa: volume_weighted(level),
        twa_premium_bps: weights.time_weighted(rows, premium),
    };
    let inav = with_inav.then(|| reference(|r| r.inav, |r| r.premium_bps));
    let fair_value = with_fair_value.then(|| reference(|r| r.fair_value, |r| r.fv_premium_bps));

    let relative = |fv: Option<Decimal>, nav: Option<Decimal>| {
        let ratio = fv?.checked_div(nav?)?;
        Some((ratio - Decimal::ONE) * BPS)
    };
    let (twa_fv_vs_inav_bps, vwa_fv_vs_inav_bps) = match (&fair_value, &inav) {
        (Some(fv), Some(nav)) => (relative(fv.twa, nav.twa), relative(fv.vwa, nav.vwa)),
        _ => (None, None),
    };

    SessionSummary {
        ticker: ticker.to_string(),
        date,
        share_volume,
        turnover,
        trade_count,
        largest_block,
        largest_block_value: largest_block.zip(vwap).map(|(block, px)| block * px),
        twa_spread_bps: weights.time_weighted(rows, |r| r.spread_bps),
        vwa_spread_bps: volume_weighted(|r| r.spread_bps),
        presence: weights.quoted.checked_div(weights.total),
        vwap,
        vwa_bid: volume_weighted(|r| r.bid),
        vwa_ask: volume_weighted(|r| r.ask),
        vwa_mid: volume_weighted(|r| r.mid),
        twa_bid: weights.time_weighted(rows, |r| r.bid),
        twa_ask: weights.time_weighted(rows, |r| r.ask),
        twa_mid: weights.time_weighted(rows, |r| r.mid),
        inav,
        fair_value,
        twa_fv_vs_inav_bps,
        vwa_fv_vs_inav_bps,
    }
}

struct Weights {
    quoted: Decimal,
    total: Decimal,
}

impl Weights {
    fn new(rows: &[QuoteRow]) -> Self {
        Self {
            quoted: rows.iter().filter_map(|r| r.adj_quote_life_secs).sum(),
            total: rows.iter().filter_map(|r| r.quote_life_secs).sum(),
        }
    }

    /// Σ value × adjusted life over Σ adjusted life; missing values count as
    /// zero in the numerator.
    fn time_weighted(&self, rows: &[QuoteRow], column: Column) -> Option<Decimal> {
        let weighted: Decimal = rows
            .iter()
            .filter_map(|r| Some(column(r)? * r.adj_quote_life_secs?))
            .sum();
        weighted.checked_div(self.quoted)
    }
}

fn fill_both_ways(rows: &[QuoteRow], column: Column) -> Vec<Option<Decimal>> {
    let mut values: Vec<Option<Decimal>> = Vec::with_capacity(rows.len());
    let mut last = None;
    for row in rows {
        last = column(row).or(last);
        values.push(last);
    }
    let first = values.iter().flatten().next().copied();
    for value in &mut values {
        if value.is_none() {
            *value = first;
        } else {
            break;
        }
    }
    values
}
