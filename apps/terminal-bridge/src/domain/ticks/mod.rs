//! Intraday Ticks and Bars
//!
//! Tick types, tick request options, input-aligned tick rows and the wide
//! (one row per timestamp) tick layout. Bars are validated and ordered
//! here as well.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::response::{BarData, TickData};
use crate::domain::security::SecurityId;
use crate::error::{BridgeError, Result};

// =============================================================================
// Tick types
// =============================================================================

/// Intraday event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TickType {
    /// Trade print.
    Trade,
    /// Bid.
    Bid,
    /// Ask.
    Ask,
    /// Best bid on the quoting exchange.
    BidBest,
    /// Best ask on the quoting exchange.
    AskBest,
    /// Composite best bid.
    BestBid,
    /// Composite best ask.
    BestAsk,
    /// Mid price.
    MidPrice,
    /// Auction trade.
    AtTrade,
    /// Settlement.
    Settle,
    /// Any other vendor event type.
    Other(String),
}

impl TickType {
    /// Vendor name of the tick type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Trade => "TRADE",
            Self::Bid => "BID",
            Self::Ask => "ASK",
            Self::BidBest => "BID_BEST",
            Self::AskBest => "ASK_BEST",
            Self::BestBid => "BEST_BID",
            Self::BestAsk => "BEST_ASK",
            Self::MidPrice => "MID_PRICE",
            Self::AtTrade => "AT_TRADE",
            Self::Settle => "SETTLE",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for TickType {
    fn from(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "TRADE" => Self::Trade,
            "BID" => Self::Bid,
            "ASK" => Self::Ask,
            "BID_BEST" => Self::BidBest,
            "ASK_BEST" => Self::AskBest,
            "BEST_BID" => Self::BestBid,
            "BEST_ASK" => Self::BestAsk,
            "MID_PRICE" => Self::MidPrice,
            "AT_TRADE" => Self::AtTrade,
            "SETTLE" => Self::Settle,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for TickType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<TickType> for String {
    fn from(value: TickType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TickType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Request options
// =============================================================================

/// Optional tick attributes to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct TickOptions {
    /// Include trade condition codes.
    pub condition_codes: bool,
    /// Include non-plottable events.
    pub non_plottable_events: bool,
    /// Include action codes.
    pub action_codes: bool,
    /// Include exchange codes.
    pub exchange_codes: bool,
    /// Include indicator codes.
    pub indicator_codes: bool,
    /// Include broker codes.
    pub broker_codes: bool,
    /// Include the reported trade time.
    pub trade_time: bool,
}

impl Default for TickOptions {
    fn default() -> Self {
        Self {
            condition_codes: false,
            non_plottable_events: false,
            action_codes: false,
            exchange_codes: false,
            indicator_codes: false,
            broker_codes: false,
            trade_time: true,
        }
    }
}

impl TickOptions {
    /// Request elements in vendor naming.
    #[must_use]
    pub fn elements(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("includeConditionCodes", self.condition_codes),
            ("includeNonPlottableEvents", self.non_plottable_events),
            ("includeActionCodes", self.action_codes),
            ("includeExchangeCodes", self.exchange_codes),
            ("includeIndicatorCodes", self.indicator_codes),
            ("includeBrokerCodes", self.broker_codes),
            ("includeTradeTime", self.trade_time),
        ]
    }
}

// =============================================================================
// Tick rows
// =============================================================================

/// A tick aligned to an input position.
///
/// An input without ticks keeps a single row whose tick columns are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRow {
    /// Ticker as supplied by the caller.
    pub ticker: String,
    /// Input position.
    pub location: usize,
    /// Event time.
    pub time: Option<DateTime<Utc>>,
    /// Tick type.
    pub tick_type: Option<TickType>,
    /// Price.
    pub value: Option<f64>,
    /// Size.
    pub size: Option<f64>,
    /// Condition codes.
    pub condition_codes: Option<String>,
    /// Exchange code.
    pub exchange_code: Option<String>,
    /// Reported trade time.
    pub trade_time: Option<DateTime<Utc>>,
}

impl TickRow {
    /// Placeholder row for an input position that produced no ticks.
    #[must_use]
    pub fn empty(ticker: impl Into<String>, location: usize) -> Self {
        Self {
            ticker: ticker.into(),
            location,
            time: None,
            tick_type: None,
            value: None,
            size: None,
            condition_codes: None,
            exchange_code: None,
            trade_time: None,
        }
    }

    /// Whether the row carries no tick.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.time.is_none()
    }
}

/// Align ticks fetched per unique security onto input positions.
///
/// Rows are ordered by location, then time. Exact duplicates on
/// (location, time, type, value) are dropped. Every location appears at
/// least once; one without ticks gets a [`TickRow::empty`] row.
#[must_use]
pub fn align_ticks<S: AsRef<str>>(
    inputs: &[S],
    securities: &[SecurityId],
    ticks: &HashMap<SecurityId, Vec<TickData>>,
) -> Vec<TickRow> {
    let mut rows = Vec::new();

    for (location, (input, security)) in inputs.iter().zip(securities).enumerate() {
        let data = ticks.get(security).map_or(&[][..], Vec::as_slice);

        let mut seen: HashSet<(NaiveDateTime, TickType, u64)> = HashSet::new();
        let mut block: Vec<TickRow> = data
            .iter()
            .filter(|tick| seen.insert((tick.time, tick.tick_type.clone(), tick.value.to_bits())))
            .map(|tick| TickRow {
                ticker: input.as_ref().to_string(),
                location,
                time: Some(tick.time.and_utc()),
                tick_type: Some(tick.tick_type.clone()),
                value: Some(tick.value),
                size: Some(tick.size),
                condition_codes: tick.condition_codes.clone(),
                exchange_code: tick.exchange_code.clone(),
                trade_time: tick.trade_time.map(|t| t.and_utc()),
            })
            .collect();

        if block.is_empty() {
            rows.push(TickRow::empty(input.as_ref(), location));
            continue;
        }
        block.sort_by_key(|row| row.time);
        rows.extend(block);
    }

    rows
}

/// Ticks pivoted to one row per timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideTickRow {
    /// Event time.
    pub time: NaiveDateTime,
    /// `{TYPE}_VALUE` and `{TYPE}_SIZE` columns.
    pub columns: BTreeMap<String, f64>,
}

impl WideTickRow {
    /// Column value by name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns.get(column).copied()
    }
}

/// Pivot ticks into one row per timestamp, sorted by time.
///
/// A later tick of the same type and time replaces an earlier one.
#[must_use]
pub fn wide_ticks(ticks: &[TickData]) -> Vec<WideTickRow> {
    let mut by_time: BTreeMap<NaiveDateTime, BTreeMap<String, f64>> = BTreeMap::new();
    for tick in ticks {
        let columns = by_time.entry(tick.time).or_default();
        columns.insert(format!("{}_VALUE", tick.tick_type), tick.value);
        columns.insert(format!("{}_SIZE", tick.tick_type), tick.size);
    }
    by_time
        .into_iter()
        .map(|(time, columns)| WideTickRow { time, columns })
        .collect()
}

// =============================================================================
// Bars
// =============================================================================

/// Smallest bar interval in minutes.
pub const MIN_BAR_INTERVAL: u32 = 1;

/// Largest bar interval in minutes.
pub const MAX_BAR_INTERVAL: u32 = 1440;

/// An intraday bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRow {
    /// Bar open time.
    pub time: DateTime<Utc>,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    pub volume: i64,
    /// Number of events.
    pub num_events: i64,
}

impl From<&BarData> for BarRow {
    fn from(bar: &BarData) -> Self {
        Self {
            time: bar.time.and_utc(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            num_events: bar.num_events,
        }
    }
}

/// Check a bar interval.
///
/// # Errors
///
/// Returns `InvalidRequest` when the interval is outside 1..=1440 minutes.
pub fn validate_bar_interval(interval: u32) -> Result<()> {
    if (MIN_BAR_INTERVAL..=MAX_BAR_INTERVAL).contains(&interval) {
        Ok(())
    } else {
        Err(BridgeError::invalid_request(format!(
            "Bar interval must be between {MIN_BAR_INTERVAL} and {MAX_BAR_INTERVAL} minutes, got {interval}"
        )))
    }
}

/// Convert bars to rows sorted by time.
#[must_use]
pub fn bar_rows(bars: &[BarData]) -> Vec<BarRow> {
    let mut rows: Vec<BarRow> = bars.iter().map(BarRow::from).collect();
    rows.sort_by_key(|row| row.time);
    rows
}
