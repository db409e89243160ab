//! Intraday Use Case
//!
//! Tick ("BDIT") and bar ("BDIB") retrieval. Intraday requests take a single
//! security, so each distinct security costs one round-trip and the results
//! are spread back over every input row that names it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::ports::SessionPort;
use crate::application::services::Connection;
use crate::domain::response::TickData;
use crate::domain::security::{SecurityId, normalize, normalize_all};
use crate::domain::ticks::{BarRow, TickOptions, TickRow, TickType, WideTickRow, align_ticks, wide_ticks};
use crate::error::{BridgeError, Result};
use crate::infrastructure::metrics;

/// Use case for intraday ticks and bars.
pub struct IntradayUseCase<S>
where
    S: SessionPort,
{
    connection: Arc<Connection<S>>,
}

impl<S> IntradayUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `IntradayUseCase`.
    pub const fn new(connection: Arc<Connection<S>>) -> Self {
        Self { connection }
    }

    /// Ticks for every ticker, aligned to input positions.
    ///
    /// Tickers without ticks contribute no rows.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when `start` is after `end` or no event type
    /// is given; otherwise propagates session errors.
    pub async fn ticks<T: AsRef<str>>(
        &self,
        tickers: &[T],
        event_types: &[TickType],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: TickOptions,
    ) -> Result<Vec<TickRow>> {
        validate_window(event_types, start, end)?;

        let securities = normalize_all(tickers);
        let mut by_security: HashMap<SecurityId, Vec<TickData>> = HashMap::new();
        let mut requested = 0;
        for security in &securities {
            if by_security.contains_key(security) {
                continue;
            }
            let ticks = self
                .connection
                .intraday_ticks(security, event_types, start, end, options)
                .await?;
            requested += 1;
            if ticks.is_empty() {
                tracing::warn!(%security, "No ticks returned");
            }
            by_security.insert(security.clone(), ticks);
        }
        metrics::record_round_trips("bdit", requested);

        Ok(align_ticks(tickers, &securities, &by_security))
    }

    /// Ticks for one ticker pivoted to one row per timestamp, with a
    /// `{TYPE}_VALUE` and `{TYPE}_SIZE` column per tick type.
    ///
    /// # Errors
    ///
    /// See [`Self::ticks`].
    pub async fn wide(
        &self,
        ticker: &str,
        event_types: &[TickType],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: TickOptions,
    ) -> Result<Vec<WideTickRow>> {
        validate_window(event_types, start, end)?;
        let ticks = self
            .connection
            .intraday_ticks(&normalize(ticker), event_types, start, end, options)
            .await?;
        metrics::record_round_trips("bdit", 1);
        Ok(wide_ticks(&ticks))
    }

    /// Bars of `interval` minutes for one ticker, sorted by time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an interval outside 1..=1440 minutes or
    /// a reversed window; otherwise propagates session errors.
    pub async fn bars(
        &self,
        ticker: &str,
        event_type: TickType,
        interval: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BarRow>> {
        validate_window(std::slice::from_ref(&event_type), start, end)?;
        let bars = self
            .connection
            .intraday_bars(&normalize(ticker), event_type, interval, start, end, &[])
            .await?;
        metrics::record_round_trips("bdib", 1);
        Ok(bars)
    }
}

fn validate_window(event_types: &[TickType], start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if event_types.is_empty() {
        return Err(BridgeError::invalid_request("event types must be non empty"));
    }
    if start > end {
        return Err(BridgeError::invalid_request(format!(
            "start {start} must not be after end {end}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, TimeZone};

    use super::*;
    use crate::application::ports::Request;
    use crate::application::use_cases::testing::connect;
    use crate::domain::response::{BarData, Event, Message, MessagePayload};
    use crate::error::ErrorCode;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn tick(time: NaiveDateTime, tick_type: TickType, value: f64) -> TickData {
        TickData {
            time,
            tick_type,
            value,
            size: 100.0,
            condition_codes: None,
            exchange_code: None,
            trade_time: None,
        }
    }

    fn responder(request: &Request, _: Option<&crate::domain::response::CorrelationId>) -> Vec<Event> {
        match request {
            Request::IntradayTick { security, .. } if security.as_str() == "JPST LN EQUITY" => {
                vec![Event::response(vec![Message::new(MessagePayload::IntradayTicks(vec![
                    tick(at(9, 1), TickType::Trade, 100.5),
                    tick(at(9, 0), TickType::BestBid, 100.4),
                    tick(at(9, 0), TickType::BestAsk, 100.6),
                    tick(at(9, 0), TickType::BestBid, 100.4),
                ]))])]
            }
            Request::IntradayBar { .. } => {
                let bar = |minute, close| BarData {
                    time: at(9, minute),
                    open: 1.0,
                    high: 2.0,
                    low: 0.5,
                    close,
                    volume: 10,
                    num_events: 2,
                };
                vec![Event::response(vec![Message::new(MessagePayload::IntradayBars(vec![
                    bar(5, 1.5),
                    bar(0, 1.2),
                ]))])]
            }
            _ => vec![Event::response(Vec::new())],
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 16, 30, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn ticks_requested_once_per_security() {
        let (session, connection) = connect(responder).await;
        let use_case = IntradayUseCase::new(connection);
        let (start, end) = window();

        let rows = use_case
            .ticks(
                &["JPST LN Equity", "EMPTY LN Equity", "jpst ln equity"],
                &[TickType::Trade, TickType::BestBid, TickType::BestAsk],
                start,
                end,
                TickOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(session.sent_requests().len(), 2);
        assert_eq!(rows.len(), 7);
        assert!(rows[..3].iter().all(|r| r.location == 0));
        assert_eq!(rows[3], TickRow::empty("EMPTY LN Equity", 1));
        assert!(rows[4..].iter().all(|r| r.ticker == "jpst ln equity" && r.location == 2));
        assert_eq!(rows[2].tick_type, Some(TickType::Trade));
        assert!(rows.windows(2).filter(|w| w[0].location == w[1].location).all(|w| w[0].time <= w[1].time));
    }

    #[tokio::test]
    async fn inputs_without_ticks_keep_a_row() {
        let (session, connection) = connect(responder).await;
        let use_case = IntradayUseCase::new(connection);
        let (start, end) = window();

        let rows = use_case
            .ticks(&["BAD LN Equity", "OTHER LN Equity"], &[TickType::Trade], start, end, TickOptions::default())
            .await
            .unwrap();

        assert_eq!(session.sent_requests().len(), 2);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(TickRow::is_empty));
        let locations: Vec<(usize, &str)> = rows.iter().map(|r| (r.location, r.ticker.as_str())).collect();
        assert_eq!(locations, vec![(0, "BAD LN Equity"), (1, "OTHER LN Equity")]);
    }

    #[tokio::test]
    async fn wide_ticks_pivot_by_time() {
        let (_, connection) = connect(responder).await;
        let use_case = IntradayUseCase::new(connection);
        let (start, end) = window();
        let rows = use_case
            .wide("JPST LN Equity", &[TickType::BestBid, TickType::BestAsk], start, end, TickOptions::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("BEST_ASK_VALUE"), Some(100.6));
        assert_eq!(rows[1].get("TRADE_SIZE"), Some(100.0));
    }

    #[tokio::test]
    async fn bars_sorted_by_time() {
        let (_, connection) = connect(responder).await;
        let use_case = IntradayUseCase::new(connection);
        let (start, end) = window();
        let bars = use_case
            .bars("JPST LN Equity", TickType::Trade, 5, start, end)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 1.2);
    }

    #[tokio::test]
    async fn reversed_window_rejected() {
        let (session, connection) = connect(responder).await;
        let use_case = IntradayUseCase::new(connection);
        let (start, end) = window();
        let err = use_case
            .ticks(&["JPST LN Equity"], &[TickType::Trade], end, start, TickOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);

        let err = use_case
            .bars("JPST LN Equity", TickType::Trade, 0, start, end)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert!(session.sent_requests().is_empty());
    }
}
