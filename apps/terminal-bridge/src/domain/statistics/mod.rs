//! Bid/Ask/Trade Session Statistics
//!
//! Rebuilds a continuous quote timeline from best bid, best ask and trade
//! ticks for one trading day and derives spread, presence and
//! volume-weighted statistics from it.
//!
//! # Pipeline
//!
//! 1. Tick time is the reported trade time when present, else the event time,
//!    converted to exchange local time. Exact duplicates are dropped and only
//!    session hours are kept.
//! 2. Ticks sharing a timestamp merge into one row. Quotes, iNAV and fair
//!    value are forward-filled; trades are not.
//! 3. Zero quotes count as missing. Quote life is the time to the next row;
//!    rows without a spread contribute no quoted time.
//! 4. Running time-weighted spread and vwap are carried on each row; the
//!    summary aggregates the whole day.

mod summary;
mod timeline;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use summary::{ReferenceSummary, SessionSummary, summarize};
pub use timeline::{BPS, QuoteRow, SessionTicks, build_timeline};

use crate::domain::exchange::ExchangeInfo;

/// Timeline and summary for one security on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Ticker as supplied by the caller.
    pub ticker: String,
    /// Local trading date.
    pub date: NaiveDate,
    /// Reconstructed quote timeline.
    pub timeline: Vec<QuoteRow>,
    /// Day summary.
    pub summary: SessionSummary,
}

/// Analyse one security's trading day.
///
/// Returns `None` when the day has no usable quotes.
#[must_use]
pub fn analyze_session(
    ticker: &str,
    date: NaiveDate,
    exchange: &ExchangeInfo,
    session: &SessionTicks,
) -> Option<SessionStats> {
    let timeline = build_timeline(exchange, session)?;
    let summary = summarize(
        ticker,
        date,
        &timeline,
        session.inav.is_some(),
        session.fair_value.is_some(),
    );
    Some(SessionStats {
        ticker: ticker.to_string(),
        date,
        timeline,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDateTime, NaiveTime};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::exchange::ExchangeDirectory;
    use crate::domain::response::TickData;
    use crate::domain::ticks::TickType;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        date().and_hms_opt(h, m, s).unwrap()
    }

    fn tick(time: NaiveDateTime, tick_type: TickType, value: f64, size: f64) -> TickData {
        TickData {
            time,
            tick_type,
            value,
            size,
            condition_codes: None,
            exchange_code: None,
            trade_time: None,
        }
    }

    fn london() -> ExchangeInfo {
        ExchangeDirectory::builtin().get("LN").unwrap().clone()
    }

    fn approx(value: Option<Decimal>) -> Option<Decimal> {
        value.map(|v| v.round_dp(8).normalize())
    }

    /// Winter date in London, so local time equals UTC.
    fn fixture() -> SessionTicks {
        SessionTicks {
            ticks: vec![
                tick(at(7, 59, 0), TickType::BestBid, 99.0, 1.0),
                tick(at(8, 0, 0), TickType::BestBid, 99.9, 10.0),
                tick(at(8, 0, 0), TickType::BestAsk, 100.1, 10.0),
                tick(at(8, 0, 10), TickType::Trade, 100.0, 50.0),
                tick(at(8, 0, 10), TickType::Trade, 100.0, 50.0),
                tick(at(8, 0, 20), TickType::BestBid, 0.0, 0.0),
                tick(at(8, 0, 30), TickType::BestBid, 99.95, 5.0),
                tick(at(8, 0, 30), TickType::BestAsk, 100.05, 5.0),
                tick(at(8, 0, 50), TickType::Trade, 100.02, 150.0),
                tick(at(16, 45, 0), TickType::Trade, 101.0, 1000.0),
            ],
            inav: None,
            fair_value: None,
        }
    }

    #[test]
    fn timeline_merges_fills_and_filters() {
        let rows = build_timeline(&london(), &fixture()).unwrap();

        let times: Vec<NaiveTime> = rows.iter().map(|r| r.time.time()).collect();
        assert_eq!(times.len(), 5);
        assert_eq!(times[0], NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(times[4], NaiveTime::from_hms_opt(8, 0, 50).unwrap());

        assert_eq!(approx(rows[0].spread_bps), Some(dec!(20)));
        assert_eq!(approx(rows[1].bid), Some(dec!(99.9)));
        assert_eq!(rows[1].trade_size, Some(dec!(50)));
        assert_eq!(rows[2].bid, None);
        assert_eq!(rows[2].spread_bps, None);
        assert_eq!(rows[2].trade_size, None);
        assert_eq!(approx(rows[3].spread_bps), Some(dec!(10)));
    }

    #[test]
    fn quote_life_and_running_statistics() {
        let rows = build_timeline(&london(), &fixture()).unwrap();

        let life: Vec<Option<Decimal>> = rows.iter().map(|r| r.quote_life_secs).collect();
        assert_eq!(life, vec![Some(dec!(10)), Some(dec!(10)), Some(dec!(10)), Some(dec!(20)), None]);
        assert_eq!(rows[2].adj_quote_life_secs, Some(Decimal::ZERO));
        assert_eq!(rows[4].adj_quote_life_secs, None);

        let twas: Vec<Option<Decimal>> = rows.iter().map(|r| approx(r.twas_bps)).collect();
        assert_eq!(twas, vec![Some(dec!(20)), Some(dec!(20)), Some(dec!(20)), Some(dec!(15)), Some(dec!(15))]);

        assert_eq!(rows[0].vwap, Decimal::ZERO);
        assert_eq!(approx(Some(rows[2].vwap)), Some(dec!(100)));
        assert_eq!(approx(Some(rows[4].vwap)), Some(dec!(100.015)));
    }

    #[test]
    fn summary_matches_hand_computed_values() {
        let stats = analyze_session("CSPX LN Equity", date(), &london(), &fixture()).unwrap();
        let summary = stats.summary;

        assert_eq!(summary.share_volume.normalize(), dec!(200));
        assert_eq!(summary.turnover.normalize(), dec!(20003));
        assert_eq!(summary.trade_count, 2);
        assert_eq!(approx(summary.largest_block), Some(dec!(150)));
        assert_eq!(approx(summary.largest_block_value), Some(dec!(15002.25)));
        assert_eq!(approx(summary.presence), Some(dec!(0.8)));
        assert_eq!(approx(summary.twa_spread_bps), Some(dec!(15)));
        assert_eq!(approx(summary.twa_bid), Some(dec!(99.925)));
        assert_eq!(approx(summary.twa_ask), Some(dec!(100.075)));
        assert_eq!(approx(summary.twa_mid), Some(dec!(100)));
        assert_eq!(approx(summary.vwap), Some(dec!(100.015)));
        assert_eq!(approx(summary.vwa_bid), Some(dec!(99.9375)));
        assert_eq!(approx(summary.vwa_ask), Some(dec!(100.0625)));
        assert_eq!(approx(summary.vwa_mid), Some(dec!(100)));
        assert_eq!(approx(summary.vwa_spread_bps), Some(dec!(12.5)));
        assert!(summary.inav.is_none());
        assert!(summary.twa_fv_vs_inav_bps.is_none());
    }

    #[test]
    fn missing_side_yields_nothing() {
        let session = SessionTicks {
            ticks: vec![
                tick(at(8, 0, 0), TickType::BestBid, 99.9, 10.0),
                tick(at(8, 0, 10), TickType::Trade, 100.0, 50.0),
            ],
            ..SessionTicks::default()
        };
        assert!(analyze_session("CSPX LN Equity", date(), &london(), &session).is_none());
    }

    #[test]
    fn trade_time_overrides_event_time() {
        let mut late = tick(at(8, 0, 40), TickType::Trade, 100.0, 10.0);
        late.trade_time = Some(at(8, 0, 5));
        let session = SessionTicks {
            ticks: vec![
                tick(at(8, 0, 0), TickType::BestBid, 99.9, 10.0),
                tick(at(8, 0, 0), TickType::BestAsk, 100.1, 10.0),
                late,
            ],
            ..SessionTicks::default()
        };
        let rows = build_timeline(&london(), &session).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].time, at(8, 0, 5));
        assert_eq!(rows[1].trade_size, Some(dec!(10)));
    }

    #[test]
    fn inav_and_fair_value_premia() {
        let mut session = fixture();
        session.inav = Some(vec![
            tick(at(8, 0, 0), TickType::Trade, 100.0, 0.0),
            tick(at(8, 0, 30), TickType::Trade, 99.5, 0.0),
        ]);
        session.fair_value = Some(vec![tick(at(8, 0, 0), TickType::Trade, 80.0, 0.0)]);

        let stats = analyze_session("CSPX LN Equity", date(), &london(), &session).unwrap();
        let rows = &stats.timeline;
        assert_eq!(approx(rows[0].premium_bps), Some(dec!(0)));
        assert_eq!(approx(rows[1].inav), Some(dec!(100)));
        assert_eq!(approx(rows[0].fv_premium_bps), Some(dec!(2500)));

        let inav = stats.summary.inav.unwrap();
        // (100 * 10 + 100 * 10 + 0 + 99.5 * 20) / 40
        assert_eq!(approx(inav.twa), Some(dec!(99.75)));
        let fair_value = stats.summary.fair_value.unwrap();
        assert_eq!(approx(fair_value.twa), Some(dec!(80)));
        assert_eq!(
            approx(stats.summary.twa_fv_vs_inav_bps),
            approx(Some((dec!(80) / dec!(99.75) - Decimal::ONE) * BPS))
        );
    }
}
