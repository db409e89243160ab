//! Connection Service
//!
//! Drives a [`SessionPort`]: start-up handshake, service opening, request
//! dispatch and response draining. Every typed call flushes stale events,
//! sends its request(s) and drains until each request has seen its final
//! `Response` event.
//!
//! # Draining
//!
//! ```text
//! loop next_event(timeout)
//!   PARTIAL_RESPONSE -> collect messages
//!   RESPONSE         -> collect messages, outstanding -= 1, stop at 0
//!   TIMEOUT          -> Timeout error
//!   anything else    -> UnexpectedEvent error
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::application::ports::{NamedValue, Request, ScreenType, Service, SessionPort};
use crate::domain::history::{HistoryLongRow, parse_historical};
use crate::domain::overrides::OverrideValue;
use crate::domain::reconcile::{
    BulkReferenceRow, ReferenceRow, parse_bulk_reference, parse_reference, security_error_count,
};
use crate::domain::response::{
    BarData, CorrelationId, Event, EventKind, Message, MessagePayload, TickData,
};
use crate::domain::security::{SecurityId, search_result_ticker};
use crate::domain::ticks::{BarRow, TickOptions, TickType, bar_rows, validate_bar_interval};
use crate::error::{BridgeError, ErrorCode, Result};
use crate::infrastructure::metrics;

/// Override carrying the point-in-time date of an equity screen.
pub const PIT_DATE_OVERRIDE: &str = "PiTDate";
/// Default override iterated by reference history calls.
pub const REFERENCE_DATE_OVERRIDE: &str = "REFERENCE_DATE";

/// One instrument search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRow {
    /// Query that produced the hit.
    pub search: String,
    /// Ticker with a title-cased yellow key, e.g. `IBM US Equity`.
    pub ticker: String,
    /// Instrument description.
    pub description: String,
    /// Rank within the query's results.
    pub position: usize,
}

/// A reference row tagged with the date override that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedRow<T> {
    /// Value of the iterated date override.
    pub date: NaiveDate,
    /// Row.
    pub row: T,
}

/// An open terminal session with its services started.
pub struct Connection<S>
where
    S: SessionPort,
{
    session: Arc<S>,
    timeout: Duration,
}

impl<S> Connection<S>
where
    S: SessionPort,
{
    /// Start a session and open every service.
    ///
    /// # Errors
    ///
    /// Returns `SessionStartFailed` when the session refuses to start,
    /// `UnexpectedEvent` when the handshake delivers the wrong event and
    /// `ServiceUnavailable` when a service cannot be opened.
    #[tracing::instrument(skip(session))]
    pub async fn start(session: Arc<S>, timeout: Duration) -> Result<Self> {
        let connection = Self { session, timeout };

        if connection.session.start().await? {
            for _ in 0..2 {
                connection.expect_event(EventKind::SessionStatus).await?;
            }
        } else {
            let event = connection.session.next_event(timeout).await?;
            for message in &event.messages {
                tracing::warn!(?message, "session start refused");
            }
            return Err(BridgeError::new(
                ErrorCode::SessionStartFailed,
                "Could not start terminal session",
            ));
        }

        for service in Service::ALL {
            connection.open_service(service).await?;
        }

        tracing::info!("terminal session started");
        Ok(connection)
    }

    /// Wrap a session that is already started and has its services open.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the session still has events queued.
    pub async fn attach(session: Arc<S>, timeout: Duration) -> Result<Self> {
        let event = session.next_event(timeout).await?;
        if event.kind != EventKind::Timeout {
            return Err(BridgeError::invalid_request(format!(
                "Session queue must be drained before attaching, received a {}",
                event.kind
            )));
        }
        Ok(Self { session, timeout })
    }

    /// Event wait timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Underlying session.
    #[must_use]
    pub const fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Stop the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionFailure` if the session reports an error.
    pub async fn stop(&self) -> Result<()> {
        self.session.stop().await?;
        tracing::info!("terminal session stopped");
        Ok(())
    }

    async fn expect_event(&self, kind: EventKind) -> Result<Event> {
        let event = self.session.next_event(self.timeout).await?;
        metrics::record_event_received(event.kind.as_str());
        tracing::debug!(event = %event.kind, messages = event.messages.len(), "event received");
        if event.kind == kind {
            Ok(event)
        } else {
            Err(BridgeError::unexpected_event(kind.as_str(), event.kind.as_str()))
        }
    }

    async fn open_service(&self, service: Service) -> Result<()> {
        let opened = self.session.open_service(service).await?;
        self.expect_event(EventKind::ServiceStatus).await?;
        if !opened {
            tracing::warn!(%service, "failed to open service");
            return Err(BridgeError::new(
                ErrorCode::ServiceUnavailable,
                format!("Could not open a {service} service"),
            )
            .with_context("service", service.uri()));
        }
        Ok(())
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Discard events left over from an earlier call.
    pub fn flush(&self) -> usize {
        let mut discarded = 0;
        while self.session.try_next_event().is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "flushed stale events");
        }
        discarded
    }

    async fn send(&self, request: Request, correlation_id: Option<CorrelationId>) -> Result<()> {
        let name = request.name();
        tracing::debug!(request = name, ?correlation_id, "sending request");
        self.session.send_request(request, correlation_id).await?;
        metrics::record_request_sent(name);
        Ok(())
    }

    /// Drain response messages until `outstanding` final responses arrive.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when no event arrives in time and `UnexpectedEvent`
    /// for any event that is not a response.
    pub async fn receive_events(&self, outstanding: usize) -> Result<Vec<Message>> {
        let started = Instant::now();
        let mut remaining = outstanding;
        let mut messages = Vec::new();

        while remaining > 0 {
            let event = self.session.next_event(self.timeout).await?;
            metrics::record_event_received(event.kind.as_str());
            tracing::debug!(event = %event.kind, messages = event.messages.len(), "event received");

            match event.kind {
                EventKind::PartialResponse => messages.extend(event.messages),
                EventKind::Response => {
                    messages.extend(event.messages);
                    remaining -= 1;
                }
                EventKind::Timeout => {
                    tracing::warn!(remaining, "timed out draining responses");
                    return Err(BridgeError::timeout());
                }
                other => {
                    for message in &event.messages {
                        tracing::warn!(?message, "unexpected event message");
                    }
                    return Err(BridgeError::new(
                        ErrorCode::UnexpectedEvent,
                        format!("Unexpected Event Type: {other}"),
                    )
                    .with_context("received", other.as_str()));
                }
            }
        }

        metrics::record_drain_duration(started.elapsed());
        Ok(messages)
    }

    async fn round_trip(&self, request: Request) -> Result<Vec<Message>> {
        self.flush();
        self.send(request, None).await?;
        self.receive_events(1).await
    }

    // =========================================================================
    // Reference data
    // =========================================================================

    /// Point-in-time reference data: one row per (security, field).
    ///
    /// # Errors
    ///
    /// Propagates session, drain and reference parsing errors.
    pub async fn reference(
        &self,
        securities: &[SecurityId],
        fields: &[String],
        overrides: &[NamedValue],
    ) -> Result<Vec<ReferenceRow>> {
        let messages = self.round_trip(reference_request(securities, fields, overrides)).await?;
        metrics::record_security_errors(security_error_count(&messages));
        parse_reference(&messages, fields)
    }

    /// Bulk reference data: one row per (security, field, position, element).
    ///
    /// # Errors
    ///
    /// Propagates session, drain and bulk parsing errors.
    pub async fn bulk_reference(
        &self,
        securities: &[SecurityId],
        fields: &[String],
        overrides: &[NamedValue],
    ) -> Result<Vec<BulkReferenceRow>> {
        let messages = self.round_trip(reference_request(securities, fields, overrides)).await?;
        metrics::record_security_errors(security_error_count(&messages));
        parse_bulk_reference(&messages, fields)
    }

    async fn send_dated(
        &self,
        securities: &[SecurityId],
        fields: &[String],
        dates: &[NaiveDate],
        date_field: &str,
        overrides: &[NamedValue],
    ) -> Result<Vec<Message>> {
        if dates.is_empty() {
            return Err(BridgeError::invalid_request("dates must be non empty"));
        }
        self.flush();
        for date in dates {
            let mut dated = overrides.to_vec();
            dated.push((date_field.to_string(), OverrideValue::from(*date)));
            let request = reference_request(securities, fields, &dated);
            self.send(request, Some(CorrelationId::from(*date))).await?;
        }
        self.receive_events(dates.len()).await
    }

    /// Reference data at each date of `dates`, sent as one request per date
    /// with `date_field` overridden. Rows are ordered by date.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty date list; otherwise propagates
    /// session and parsing errors.
    pub async fn reference_history(
        &self,
        securities: &[SecurityId],
        fields: &[String],
        dates: &[NaiveDate],
        date_field: &str,
        overrides: &[NamedValue],
    ) -> Result<Vec<DatedRow<ReferenceRow>>> {
        let messages = self.send_dated(securities, fields, dates, date_field, overrides).await?;
        let mut rows = parse_reference(&messages, fields)?
            .into_iter()
            .map(|row| {
                let cid = row.correlation_ids.first().cloned();
                dated(cid.as_ref(), row)
            })
            .collect::<Result<Vec<_>>>()?;
        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }

    /// Bulk reference data at each date of `dates`. Rows are ordered by date,
    /// then position.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty date list; otherwise propagates
    /// session and parsing errors.
    pub async fn bulk_reference_history(
        &self,
        securities: &[SecurityId],
        fields: &[String],
        dates: &[NaiveDate],
        date_field: &str,
        overrides: &[NamedValue],
    ) -> Result<Vec<DatedRow<BulkReferenceRow>>> {
        let messages = self.send_dated(securities, fields, dates, date_field, overrides).await?;
        let mut rows = parse_bulk_reference(&messages, fields)?
            .into_iter()
            .map(|row| {
                let cid = row.correlation_ids.first().cloned();
                dated(cid.as_ref(), row)
            })
            .collect::<Result<Vec<_>>>()?;
        rows.sort_by_key(|r| (r.date, r.row.position));
        Ok(rows)
    }

    // =========================================================================
    // Historical data
    // =========================================================================

    /// Historical data as long rows. Elements with an empty value are not
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError` or `InvalidField` when the vendor flags the
    /// request; otherwise propagates session errors.
    pub async fn historical(
        &self,
        securities: &[SecurityId],
        fields: &[String],
        elements: &[NamedValue],
        overrides: &[NamedValue],
    ) -> Result<Vec<HistoryLongRow>> {
        let request = Request::HistoricalData {
            securities: securities.to_vec(),
            fields: fields.to_vec(),
            elements: elements
                .iter()
                .filter(|(_, value)| !value.as_str().is_empty())
                .cloned()
                .collect(),
            overrides: overrides.to_vec(),
        };
        let messages = self.round_trip(request).await?;
        parse_historical(&messages)
    }

    // =========================================================================
    // Intraday data
    // =========================================================================

    /// Raw ticks for one security.
    ///
    /// # Errors
    ///
    /// Propagates session and drain errors.
    pub async fn intraday_ticks(
        &self,
        security: &SecurityId,
        event_types: &[TickType],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: TickOptions,
    ) -> Result<Vec<TickData>> {
        let request = Request::IntradayTick {
            security: security.clone(),
            event_types: event_types.to_vec(),
            start,
            end,
            options,
        };
        let messages = self.round_trip(request).await?;
        let mut ticks = Vec::new();
        for message in messages {
            match message.payload {
                MessagePayload::IntradayTicks(data) => ticks.extend(data),
                other => return Err(unexpected_payload("IntradayTickResponse", &other)),
            }
        }
        Ok(ticks)
    }

    /// Intraday bars for one security, sorted by time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an interval outside 1..=1440 minutes;
    /// otherwise propagates session errors.
    pub async fn intraday_bars(
        &self,
        security: &SecurityId,
        event_type: TickType,
        interval: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        elements: &[NamedValue],
    ) -> Result<Vec<BarRow>> {
        validate_bar_interval(interval)?;
        let request = Request::IntradayBar {
            security: security.clone(),
            event_type,
            interval,
            start,
            end,
            elements: elements.to_vec(),
        };
        let messages = self.round_trip(request).await?;
        let mut bars: Vec<BarData> = Vec::new();
        for message in messages {
            match message.payload {
                MessagePayload::IntradayBars(data) => bars.extend(data),
                other => return Err(unexpected_payload("IntradayBarResponse", &other)),
            }
        }
        Ok(bar_rows(&bars))
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Instrument search.
    ///
    /// # Errors
    ///
    /// Propagates session and drain errors.
    pub async fn instrument_list(
        &self,
        query: &str,
        max_results: Option<u32>,
        yellow_key_filter: Option<&str>,
    ) -> Result<Vec<InstrumentRow>> {
        let request = Request::InstrumentList {
            query: query.to_string(),
            max_results,
            yellow_key_filter: yellow_key_filter.map(|yk| format!("YK_FILTER_{yk}")),
        };
        let messages = self.round_trip(request).await?;
        let mut rows = Vec::new();
        for message in messages {
            match message.payload {
                MessagePayload::InstrumentList(results) => {
                    rows.extend(results.into_iter().enumerate().map(|(position, hit)| {
                        InstrumentRow {
                            search: query.to_string(),
                            ticker: search_result_ticker(&hit.security),
                            description: hit.description,
                            position,
                        }
                    }));
                }
                other => return Err(unexpected_payload("InstrumentListResponse", &other)),
            }
        }
        Ok(rows)
    }

    /// Run an equity screen, optionally as of a past date. Returns the
    /// security names the screen produced.
    ///
    /// # Errors
    ///
    /// Propagates session and drain errors.
    pub async fn equity_screen(
        &self,
        screen_name: &str,
        screen_type: ScreenType,
        language_id: Option<&str>,
        group: Option<&str>,
        as_of: Option<NaiveDate>,
    ) -> Result<Vec<String>> {
        let overrides = as_of
            .map(|date| vec![(PIT_DATE_OVERRIDE.to_string(), OverrideValue::from(date))])
            .unwrap_or_default();
        let request = Request::Beqs {
            screen_name: screen_name.to_string(),
            screen_type,
            language_id: language_id.map(str::to_string),
            group: group.map(str::to_string),
            overrides,
        };
        let messages = self.round_trip(request).await?;
        let mut securities = Vec::new();
        for message in messages {
            match message.payload {
                MessagePayload::ScreenResults(names) => securities.extend(names),
                other => return Err(unexpected_payload("BeqsResponse", &other)),
            }
        }
        Ok(securities)
    }

    /// Grid search. Returns every string field of every record, in order.
    ///
    /// # Errors
    ///
    /// Propagates session and drain errors.
    pub async fn grid_search(&self, domain: &str) -> Result<Vec<String>> {
        let request = Request::ExcelGetGrid {
            domain: domain.to_string(),
        };
        let messages = self.round_trip(request).await?;
        let mut values = Vec::new();
        for message in messages {
            match message.payload {
                MessagePayload::GridRecords(records) => values.extend(records.into_iter().flatten()),
                other => return Err(unexpected_payload("ExcelGetGridResponse", &other)),
            }
        }
        Ok(values)
    }
}

fn reference_request(securities: &[SecurityId], fields: &[String], overrides: &[NamedValue]) -> Request {
    Request::ReferenceData {
        securities: securities.to_vec(),
        fields: fields.to_vec(),
        overrides: overrides.to_vec(),
    }
}

fn unexpected_payload(expected: &str, payload: &MessagePayload) -> BridgeError {
    BridgeError::new(
        ErrorCode::UnexpectedEvent,
        format!("Expected a {expected} but received a {}", payload.schema()),
    )
}

fn dated<T>(correlation_id: Option<&CorrelationId>, row: T) -> Result<DatedRow<T>> {
    let date = correlation_id
        .and_then(|cid| NaiveDate::parse_from_str(cid.as_str(), "%Y%m%d").ok())
        .ok_or_else(|| {
            BridgeError::new(
                ErrorCode::UnexpectedEvent,
                "Response message carries no date correlation id",
            )
        })?;
    Ok(DatedRow { date, row })
}
