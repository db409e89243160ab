//! Historical Request Integration Tests
//!
//! Point-in-time and series history through a scripted session, including
//! per-security date windows that split into separate requests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};

use terminal_bridge::application::services::Connection;
use terminal_bridge::application::use_cases::{HistoricalDataUseCase, HistoryOutput};
use terminal_bridge::domain::history::{END_DATE, HistoryOptions, PERIODICITY, Periodicity, START_DATE};
use terminal_bridge::domain::overrides::RequestColumns;
use terminal_bridge::domain::response::{
    CorrelationId, Event, HistoricalRow, HistoricalSecurityData, Message, MessagePayload,
};
use terminal_bridge::{FieldValue, NamedValue, Request, ScriptedSession};

fn element<'a>(elements: &'a [NamedValue], name: &str) -> Option<&'a str> {
    elements
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Every day in the window, valued at the day of month.
fn responder(request: &Request, _: Option<&CorrelationId>) -> Vec<Event> {
    let Request::HistoricalData {
        securities,
        fields,
        elements,
        ..
    } = request
    else {
        return vec![Event::response(Vec::new())];
    };
    let date = |name| {
        element(elements, name).and_then(|v| NaiveDate::parse_from_str(v, "%Y%m%d").ok())
    };
    let (Some(start), Some(end)) = (date(START_DATE), date(END_DATE)) else {
        return vec![Event::response(Vec::new())];
    };

    let messages = securities
        .iter()
        .map(|security| {
            let field_data = start
                .iter_days()
                .take_while(|d| *d <= end)
                .map(|d| HistoricalRow {
                    date: d,
                    fields: fields
                        .iter()
                        .map(|f| (f.clone(), FieldValue::Int(i64::from(d.day()))))
                        .collect::<BTreeMap<_, _>>(),
                })
                .collect();
            Message::new(MessagePayload::HistoricalData(HistoricalSecurityData {
                security: security.to_string(),
                field_data,
                ..HistoricalSecurityData::default()
            }))
        })
        .collect();
    vec![Event::response(messages)]
}

async fn use_case() -> (Arc<ScriptedSession>, HistoricalDataUseCase<ScriptedSession>) {
    let session = Arc::new(ScriptedSession::new().with_responder(responder));
    let connection = Connection::start(Arc::clone(&session), Duration::from_millis(10))
        .await
        .unwrap();
    (session, HistoricalDataUseCase::new(Arc::new(connection)))
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

#[tokio::test]
async fn single_date_returns_one_value_per_input() {
    let (session, use_case) = use_case().await;
    let options = HistoryOptions::between(day(5), day(5));

    let output = use_case
        .execute(&["IBM US Equity", "VOD LN Equity", "IBM US Equity"], "PX_LAST", &options, &RequestColumns::new())
        .await
        .unwrap();

    let HistoryOutput::Point(values) = output else {
        panic!("expected point values");
    };
    assert_eq!(values, vec![FieldValue::Int(5); 3]);
    assert_eq!(session.sent_requests().len(), 1);
}

#[tokio::test]
async fn per_security_windows_split_requests() {
    let (session, use_case) = use_case().await;
    let options = HistoryOptions {
        start_dates: vec![day(1), day(10)],
        end_dates: vec![day(3), day(11)],
        ..HistoryOptions::between(day(1), day(3))
    };

    let output = use_case
        .execute(&["IBM US Equity", "VOD LN Equity"], "PX_LAST", &options, &RequestColumns::new())
        .await
        .unwrap();

    let HistoryOutput::Series(rows) = output else {
        panic!("expected a series");
    };
    let summary: Vec<(&str, Option<u32>)> = rows
        .iter()
        .map(|r| (r.ticker.as_str(), r.date.map(|d| d.day())))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("IBM US Equity", Some(1)),
            ("IBM US Equity", Some(2)),
            ("IBM US Equity", Some(3)),
            ("VOD LN Equity", Some(10)),
            ("VOD LN Equity", Some(11)),
        ]
    );
    assert_eq!(session.sent_requests().len(), 2);
}

#[tokio::test]
async fn frame_pivots_fields_by_date() {
    let (session, use_case) = use_case().await;
    let options = HistoryOptions::between(day(1), day(2)).with_periodicity(Periodicity::Weekly);

    let frame = use_case
        .frame(
            &["IBM US Equity"],
            &["PX_BID".to_string(), "PX_ASK".to_string()],
            &options,
            &RequestColumns::new(),
        )
        .await
        .unwrap();

    assert_eq!(frame.dates, vec![day(1), day(2)]);
    assert_eq!(frame.columns.len(), 2);
    assert_eq!(frame.get(day(2), "IBM US EQUITY", "PX_ASK"), Some(&FieldValue::Int(2)));

    let (request, _) = &session.sent_requests()[0];
    let Request::HistoricalData { elements, .. } = request else {
        panic!("expected a historical request");
    };
    assert_eq!(element(elements, PERIODICITY), Some("WEEKLY"));
}
