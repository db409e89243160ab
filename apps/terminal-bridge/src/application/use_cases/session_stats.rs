//! Session Statistics Use Case
//!
//! Bid/ask/trade analysis ("BBAT") over a range of local trading days. Each
//! (ticker, day) pulls best bid, best ask and trade ticks for the exchange's
//! local calendar day, plus optional iNAV and fair value prints, and hands
//! them to [`analyze_session`].

use std::sync::Arc;

use chrono::NaiveDate;

use crate::application::ports::SessionPort;
use crate::application::services::Connection;
use crate::domain::exchange::{ExchangeDirectory, ExchangeInfo};
use crate::domain::overrides::RequestColumns;
use crate::domain::response::TickData;
use crate::domain::security::{SecurityId, normalize};
use crate::domain::statistics::{SessionStats, SessionTicks, analyze_session};
use crate::domain::ticks::{TickOptions, TickType};
use crate::error::{BridgeError, Result};

use super::exchange::ExchangeResolutionUseCase;
use super::reference::ReferenceDataUseCase;

/// Field holding an ETF's iNAV ticker.
pub const INAV_TICKER_FIELD: &str = "ETF_INAV_TICKER";

const INAV_YELLOW_KEY: &str = "Index";

/// Options of a session statistics run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatsOptions {
    /// Track the ETF's iNAV alongside the quotes.
    pub inav: bool,
    /// Ticker whose trades are tracked as a fair value.
    pub fair_value: Option<String>,
    /// Include non-plottable events (quote-related messages) in the ticks.
    pub non_plottable_events: bool,
}

impl Default for SessionStatsOptions {
    fn default() -> Self {
        Self {
            inav: true,
            fair_value: None,
            non_plottable_events: true,
        }
    }
}

/// Use case computing per-day session statistics.
pub struct SessionStatisticsUseCase<S>
where
    S: SessionPort,
{
    connection: Arc<Connection<S>>,
    reference: ReferenceDataUseCase<S>,
    exchanges: ExchangeResolutionUseCase<S>,
}

impl<S> SessionStatisticsUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `SessionStatisticsUseCase`.
    pub fn new(connection: Arc<Connection<S>>, directory: Arc<ExchangeDirectory>) -> Self {
        Self {
            reference: ReferenceDataUseCase::new(Arc::clone(&connection)),
            exchanges: ExchangeResolutionUseCase::new(Arc::clone(&connection), directory),
            connection,
        }
    }

    /// Statistics for every ticker and every calendar day from `start` to
    /// `end` (inclusive, defaulting to `start`).
    ///
    /// Days whose tick request fails or that have no quotes are skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when `end` precedes `start`, exchange
    /// resolution errors, and `NoData` when no day produced statistics.
    pub async fn execute<T: AsRef<str>>(
        &self,
        tickers: &[T],
        start: NaiveDate,
        end: Option<NaiveDate>,
        options: &SessionStatsOptions,
    ) -> Result<Vec<SessionStats>> {
        let end = end.unwrap_or(start);
        if end < start {
            return Err(BridgeError::invalid_request(format!(
                "end date {end} must not precede start date {start}"
            )));
        }

        let fair_value = options.fair_value.as_deref().map(normalize);
        let mut results = Vec::new();

        for ticker in tickers.iter().map(AsRef::as_ref) {
            let exchange = self.exchanges.resolve(ticker, false).await?;
            let inav = if options.inav {
                self.inav_ticker(ticker).await?
            } else {
                None
            };
            let sources = Sources {
                security: normalize(ticker),
                inav,
                fair_value: fair_value.clone(),
            };

            for date in start.iter_days().take_while(|d| *d <= end) {
                match self.day(ticker, date, &exchange, &sources, options).await {
                    Ok(Some(stats)) => results.push(stats),
                    Ok(None) => tracing::info!(ticker, %date, "No data found"),
                    Err(error) => tracing::warn!(ticker, %date, %error, "Skipping day"),
                }
            }
        }

        if results.is_empty() {
            return Err(BridgeError::no_data("No data found for the period"));
        }
        Ok(results)
    }

    async fn inav_ticker(&self, ticker: &str) -> Result<Option<SecurityId>> {
        let values = self
            .reference
            .field(&[ticker], INAV_TICKER_FIELD, &RequestColumns::new())
            .await?;
        let inav = values
            .first()
            .filter(|value| !value.is_missing())
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| normalize(&format!("{code} {INAV_YELLOW_KEY}")));
        if inav.is_none() {
            tracing::warn!(ticker, "No iNAV ticker, continuing without iNAV");
        }
        Ok(inav)
    }

    async fn day(
        &self,
        ticker: &str,
        date: NaiveDate,
        exchange: &ExchangeInfo,
        sources: &Sources,
        options: &SessionStatsOptions,
    ) -> Result<Option<SessionStats>> {
        let (start, end) = exchange.session_window(date)?;
        let tick_options = TickOptions {
            condition_codes: true,
            non_plottable_events: options.non_plottable_events,
            ..TickOptions::default()
        };
        let ticks = self
            .connection
            .intraday_ticks(
                &sources.security,
                &[TickType::BestBid, TickType::BestAsk, TickType::Trade],
                start,
                end,
                tick_options,
            )
            .await?;

        let inav = self.trades(sources.inav.as_ref(), start, end).await?;
        let fair_value = self.trades(sources.fair_value.as_ref(), start, end).await?;

        Ok(analyze_session(
            ticker,
            date,
            exchange,
            &SessionTicks {
                ticks,
                inav,
                fair_value,
            },
        ))
    }

    async fn trades(
        &self,
        security: Option<&SecurityId>,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<Vec<TickData>>> {
        let Some(security) = security else {
            return Ok(None);
        };
        let ticks = self
            .connection
            .intraday_ticks(security, &[TickType::Trade], start, end, TickOptions::default())
            .await?;
        Ok(Some(ticks))
    }
}

struct Sources {
    security: SecurityId,
    inav: Option<SecurityId>,
    fair_value: Option<SecurityId>,
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDateTime, Timelike};

    use super::*;
    use crate::application::ports::Request;
    use crate::application::use_cases::testing::connect;
    use crate::domain::response::{Event, Message, MessagePayload, SecurityData};
    use crate::error::ErrorCode;

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

    /// London ETF quoting 100/101 all day with one trade; no quotes on
    /// 2024-03-02. The iNAV prints 100.2.
    fn responder(request: &Request, _: Option<&crate::domain::response::CorrelationId>) -> Vec<Event> {
        let payload = match request {
            Request::ReferenceData { securities, .. } => MessagePayload::ReferenceData(
                securities
                    .iter()
                    .map(|s| match s.as_str() {
                        "JPST LN EQUITY" => SecurityData::new(s.as_str()).with_field(INAV_TICKER_FIELD, "JPSTIV"),
                        other => SecurityData::new(other),
                    })
                    .collect(),
            ),
            Request::IntradayTick { security, start, .. } => {
                let day = start.date_naive();
                let at = |h: u32, m: u32| day.and_hms_opt(h, m, 0).unwrap();
                let ticks = match security.as_str() {
                    "JPST LN EQUITY" if day.to_string() != "2024-03-02" => vec![
                        tick(at(8, 0), TickType::BestBid, 100.0, 500.0),
                        tick(at(8, 0), TickType::BestAsk, 101.0, 500.0),
                        tick(at(12, 0), TickType::Trade, 100.5, 20.0),
                    ],
                    "JPSTIV INDEX" => vec![tick(at(8, 0), TickType::Trade, 100.2, 0.0)],
                    "FAIL LN EQUITY" => return vec![Event::timeout()],
                    _ => Vec::new(),
                };
                MessagePayload::IntradayTicks(ticks)
            }
            _ => return vec![Event::response(Vec::new())],
        };
        vec![Event::response(vec![Message::new(payload)])]
    }

    fn use_case(connection: Arc<Connection<crate::infrastructure::replay::ScriptedSession>>) -> SessionStatisticsUseCase<crate::infrastructure::replay::ScriptedSession> {
        SessionStatisticsUseCase::new(connection, Arc::new(ExchangeDirectory::builtin()))
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[tokio::test]
    async fn days_without_quotes_are_skipped() {
        let (session, connection) = connect(responder).await;
        let stats = use_case(connection)
            .execute(&["JPST LN Equity"], date(1), Some(date(3)), &SessionStatsOptions::default())
            .await
            .unwrap();

        let dates: Vec<NaiveDate> = stats.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![date(1), date(3)]);
        assert_eq!(stats[0].ticker, "JPST LN Equity");
        assert!(stats[0].summary.inav.is_some());
        assert_eq!(stats[0].summary.trade_count, 1);

        let sent = session.sent_requests();
        let Request::IntradayTick { options, start, .. } = &sent[1].0 else {
            panic!("expected an intraday tick request");
        };
        assert!(options.condition_codes);
        assert!(options.non_plottable_events);
        assert_eq!(start.time().hour(), 0);
    }

    #[tokio::test]
    async fn missing_inav_ticker_is_not_fatal() {
        let (_, connection) = connect(responder).await;
        let options = SessionStatsOptions {
            fair_value: Some("JPSTIV Index".to_string()),
            ..SessionStatsOptions::default()
        };
        let err = use_case(connection)
            .execute(&["OTHER LN Equity"], date(1), None, &options)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoData);
        assert_eq!(err.message(), "No data found for the period");
    }

    #[tokio::test]
    async fn fair_value_tracked_without_inav() {
        let (_, connection) = connect(responder).await;
        let options = SessionStatsOptions {
            inav: false,
            fair_value: Some("JPSTIV Index".to_string()),
            non_plottable_events: false,
        };
        let stats = use_case(connection)
            .execute(&["JPST LN Equity"], date(1), None, &options)
            .await
            .unwrap();
        assert_eq!(stats.len(), 1);
        assert!(stats[0].summary.inav.is_none());
        assert!(stats[0].summary.fair_value.is_some());
    }

    #[tokio::test]
    async fn failing_days_and_bad_ranges() {
        let (_, connection) = connect(responder).await;
        let use_case = use_case(connection);
        let options = SessionStatsOptions {
            inav: false,
            ..SessionStatsOptions::default()
        };

        let err = use_case
            .execute(&["FAIL LN Equity"], date(1), None, &options)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoData);

        let err = use_case
            .execute(&["JPST LN Equity"], date(3), Some(date(1)), &options)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);

        let err = use_case
            .execute(&["JPST Equity"], date(1), None, &options)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }
}
