//! Quote timeline reconstruction.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::exchange::ExchangeInfo;
use crate::domain::response::TickData;
use crate::domain::ticks::TickType;

/// Basis points per unit.
pub const BPS: Decimal = dec!(10000);

/// Ticks for one security and one local trading day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTicks {
    /// Best bid, best ask and trade ticks.
    pub ticks: Vec<TickData>,
    /// iNAV trade ticks, when requested.
    pub inav: Option<Vec<TickData>>,
    /// Fair value trade ticks, when requested.
    pub fair_value: Option<Vec<TickData>>,
}

/// One row of the reconstructed quote timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRow {
    /// Exchange local time.
    pub time: NaiveDateTime,
    /// Best bid (forward-filled, zero treated as missing).
    pub bid: Option<Decimal>,
    /// Best bid size (forward-filled).
    pub bid_size: Option<Decimal>,
    /// Best ask (forward-filled, zero treated as missing).
    pub ask: Option<Decimal>,
    /// Best ask size (forward-filled).
    pub ask_size: Option<Decimal>,
    /// Trade price at this time.
    pub trade_price: Option<Decimal>,
    /// Trade size at this time.
    pub trade_size: Option<Decimal>,
    /// iNAV (forward-filled).
    pub inav: Option<Decimal>,
    /// Fair value (forward-filled).
    pub fair_value: Option<Decimal>,
    /// Ask minus bid.
    pub spread: Option<Decimal>,
    /// Mid price.
    pub mid: Option<Decimal>,
    /// Spread over mid in basis points.
    pub spread_bps: Option<Decimal>,
    /// Seconds until the next row.
    pub quote_life_secs: Option<Decimal>,
    /// Quote life, zero where no spread is quoted.
    pub adj_quote_life_secs: Option<Decimal>,
    /// Running time-weighted spread.
    pub twas_bps: Option<Decimal>,
    /// Running volume-weighted trade price.
    pub vwap: Decimal,
    /// Mid premium to iNAV in basis points.
    pub premium_bps: Option<Decimal>,
    /// Mid premium to fair value in basis points.
    pub fv_premium_bps: Option<Decimal>,
}

#[derive(Debug, Default)]
struct Slot {
    bid: Option<Decimal>,
    bid_size: Option<Decimal>,
    ask: Option<Decimal>,
    ask_size: Option<Decimal>,
    traded: bool,
    trade_notional: Decimal,
    trade_size: Decimal,
    trade_last: Option<Decimal>,
    inav: Option<Decimal>,
    fair_value: Option<Decimal>,
}

fn decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok()
}

fn local_time(exchange: &ExchangeInfo, utc: NaiveDateTime) -> NaiveDateTime {
    exchange.to_local(utc.and_utc()).naive_local()
}

fn seconds_between(from: NaiveDateTime, to: NaiveDateTime) -> Decimal {
    Decimal::new((to - from).num_milliseconds(), 3)
}

fn premium(mid: Option<Decimal>, reference: Option<Decimal>) -> Option<Decimal> {
    let ratio = mid?.checked_div(reference.filter(|r| !r.is_zero())?)?;
    Some((ratio - Decimal::ONE) * BPS)
}

/// Rebuild the quote timeline for one trading day.
///
/// Returns `None` when the day has no best bid or no best ask, or when
/// nothing falls inside the session.
#[must_use]
pub fn build_timeline(exchange: &ExchangeInfo, session: &SessionTicks) -> Option<Vec<QuoteRow>> {
    let has = |kind: TickType| session.ticks.iter().any(|t| t.tick_type == kind);
    if !has(TickType::BestBid) || !has(TickType::BestAsk) {
        return None;
    }

    let mut slots: BTreeMap<NaiveDateTime, Slot> = BTreeMap::new();
    let mut seen = HashSet::new();

    for tick in &session.ticks {
        let local = local_time(exchange, tick.trade_time.unwrap_or(tick.time));
        let key = (local, tick.tick_type.clone(), tick.value.to_bits(), tick.size.to_bits());
        if !seen.insert(key) || !exchange.in_session(local.time()) {
            continue;
        }
        let slot = slots.entry(local).or_default();
        match tick.tick_type {
            TickType::BestBid => {
                slot.bid = decimal(tick.value);
                slot.bid_size = decimal(tick.size);
            }
            TickType::BestAsk => {
                slot.ask = decimal(tick.value);
                slot.ask_size = decimal(tick.size);
            }
            TickType::Trade => {
                if let (Some(price), Some(size)) = (decimal(tick.value), decimal(tick.size)) {
                    slot.traded = true;
                    slot.trade_notional += price * size;
                    slot.trade_size += size;
                    slot.trade_last = Some(price);
                }
            }
            _ => {}
        }
    }

    let references: [(Option<&Vec<TickData>>, fn(&mut Slot, Decimal)); 2] = [
        (session.inav.as_ref(), |slot, v| slot.inav = Some(v)),
        (session.fair_value.as_ref(), |slot, v| slot.fair_value = Some(v)),
    ];
    for (series, assign) in references {
        for tick in series.into_iter().flatten() {
            let local = local_time(exchange, tick.time);
            if tick.tick_type != TickType::Trade || !exchange.in_session(local.time()) {
                continue;
            }
            if let Some(value) = decimal(tick.value) {
                assign(slots.entry(local).or_default(), value);
            }
        }
    }

    if slots.is_empty() {
        return None;
    }

    let mut rows = fill_forward(slots);
    apply_quote_life(&mut rows);
    apply_running_stats(&mut rows);
    Some(rows)
}

fn fill_forward(slots: BTreeMap<NaiveDateTime, Slot>) -> Vec<QuoteRow> {
    let mut rows = Vec::with_capacity(slots.len());
    let mut last = Slot::default();

    for (time, slot) in slots {
        last.bid = slot.bid.or(last.bid);
        last.bid_size = slot.bid_size.or(last.bid_size);
        last.ask = slot.ask.or(last.ask);
        last.ask_size = slot.ask_size.or(last.ask_size);
        last.inav = slot.inav.or(last.inav);
        last.fair_value = slot.fair_value.or(last.fair_value);

        let trade_price = if slot.traded {
            slot.trade_notional
                .checked_div(slot.trade_size)
                .or(slot.trade_last)
        } else {
            None
        };

        let bid = last.bid.filter(|v| !v.is_zero());
        let ask = last.ask.filter(|v| !v.is_zero());
        let (spread, mid, spread_bps) = match (bid, ask) {
            (Some(bid), Some(ask)) => {
                let spread = ask - bid;
                let mid = (ask + bid) / Decimal::TWO;
                (Some(spread), Some(mid), spread.checked_div(mid).map(|r| r * BPS))
            }
            _ => (None, None, None),
        };

        rows.push(QuoteRow {
            time,
            bid,
            bid_size: last.bid_size,
            ask,
            ask_size: last.ask_size,
            trade_price,
            trade_size: slot.traded.then_some(slot.trade_size),
            inav: last.inav,
            fair_value: last.fair_value,
            spread,
            mid,
            spread_bps,
            quote_life_secs: None,
            adj_quote_life_secs: None,
            twas_bps: None,
            vwap: Decimal::ZERO,
            premium_bps: premium(mid, last.inav),
            fv_premium_bps: premium(mid, last.fair_value),
        });
    }

    rows
}

fn apply_quote_life(rows: &mut [QuoteRow]) {
    let times: Vec<NaiveDateTime> = rows.iter().map(|r| r.time).collect();
    for (i, row) in rows.iter_mut().enumerate() {
        let life = times.get(i + 1).map(|next| seconds_between(row.time, *next));
        row.quote_life_secs = life;
        row.adj_quote_life_secs = if row.spread_bps.is_none() {
            Some(Decimal::ZERO)
        } else {
            life
        };
    }
}

fn apply_running_stats(rows: &mut [QuoteRow]) {
    let mut weighted_spread = Decimal::ZERO;
    let mut quoted_secs = Decimal::ZERO;
    let mut twas = None;
    let mut notional = Decimal::ZERO;
    let mut volume = Decimal::ZERO;

    for row in rows {
        if let Some(adj) = row.adj_quote_life_secs {
            weighted_spread += row.spread_bps.unwrap_or_default() * adj;
            quoted_secs += adj;
            twas = weighted_spread.checked_div(quoted_secs).or(twas);
        }
        row.twas_bps = twas;

        if let (Some(price), Some(size)) = (row.trade_price, row.trade_size) {
            notional += price * size;
            volume += size;
        }
        row.vwap = notional.checked_div(volume).unwrap_or_default();
    }
}
