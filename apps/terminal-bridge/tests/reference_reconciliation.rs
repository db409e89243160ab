//! Reference Reconciliation Integration Tests
//!
//! Drives reference and bulk queries through a scripted session and checks
//! that answers come back aligned with the caller's input, and that a
//! recorded transcript replays to the same result.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use terminal_bridge::application::services::Connection;
use terminal_bridge::application::use_cases::{BulkDataUseCase, ReferenceDataUseCase};
use terminal_bridge::domain::overrides::{OverrideColumn, RequestColumns};
use terminal_bridge::domain::response::{
    CorrelationId, ErrorInfo, Event, Message, MessagePayload, SecurityData,
};
use terminal_bridge::{
    BulkRow, ErrorCode, FieldValue, NamedValue, Request, ScriptedSession, SecurityId, Transcript,
};

fn px_last(security: &str, overrides: &[NamedValue]) -> SecurityData {
    let data = SecurityData::new(security);
    match security {
        "UNKNOWN US EQUITY" => data.with_security_error(ErrorInfo::new(
            "BAD_SEC",
            "INVALID_SECURITY",
            "Unknown/Invalid security",
        )),
        "IBM US EQUITY" => {
            let currency = overrides
                .iter()
                .find(|(name, _)| name == "EQY_FUND_CRNCY")
                .map_or("USD", |(_, v)| v.as_str());
            let price = if currency == "EUR" { 130.5 } else { 142.0 };
            data.with_field("PX_LAST", price).with_field("CRNCY", currency)
        }
        _ => data.with_field("PX_LAST", 10.0).with_field("CRNCY", "GBP"),
    }
}

fn responder(request: &Request, _: Option<&CorrelationId>) -> Vec<Event> {
    match request {
        Request::ReferenceData {
            securities, fields, ..
        } if fields.iter().any(|f| f == "DVD_HIST") => {
            let data = securities
                .iter()
                .map(|s| {
                    SecurityData::new(s.as_str()).with_field(
                        "DVD_HIST",
                        FieldValue::Bulk(vec![
                            BulkRow::new([("Ex-Date", FieldValue::from("2024-02-09"))]),
                            BulkRow::new([("Ex-Date", FieldValue::from("2023-11-09"))]),
                        ]),
                    )
                })
                .collect();
            vec![Event::response(vec![Message::new(MessagePayload::ReferenceData(data))])]
        }
        Request::ReferenceData {
            securities,
            overrides,
            ..
        } => {
            // Split the answer over a partial and a final response.
            let mid = securities.len() / 2;
            let (head, tail) = securities.split_at(mid);
            let build = |part: &[SecurityId]| {
                Message::new(MessagePayload::ReferenceData(
                    part.iter().map(|s| px_last(s.as_str(), overrides)).collect(),
                ))
            };
            vec![Event::partial(vec![build(head)]), Event::response(vec![build(tail)])]
        }
        _ => vec![Event::response(Vec::new())],
    }
}

/// Answers in reverse request order, split over a partial and a final event.
fn reversed_responder(request: &Request, _: Option<&CorrelationId>) -> Vec<Event> {
    let Request::ReferenceData {
        securities,
        overrides,
        ..
    } = request
    else {
        return vec![Event::response(Vec::new())];
    };
    let mut reversed: Vec<&SecurityId> = securities.iter().collect();
    reversed.reverse();
    let (head, tail) = reversed.split_at(reversed.len().div_ceil(2));
    let build = |part: &[&SecurityId]| {
        Message::new(MessagePayload::ReferenceData(
            part.iter().map(|s| px_last(s.as_str(), overrides)).collect(),
        ))
    };
    vec![Event::partial(vec![build(head)]), Event::response(vec![build(tail)])]
}

async fn connect(session: ScriptedSession) -> (Arc<ScriptedSession>, Arc<Connection<ScriptedSession>>) {
    let session = Arc::new(session);
    let connection = Connection::start(Arc::clone(&session), Duration::from_millis(10))
        .await
        .unwrap();
    (session, Arc::new(connection))
}

#[tokio::test]
async fn rows_follow_input_order_across_partial_responses() {
    let (session, connection) = connect(ScriptedSession::new().with_responder(responder)).await;
    let use_case = ReferenceDataUseCase::new(connection);

    let tickers = ["VOD LN Equity", "IBM US Equity", "Unknown US Equity", "vod ln equity"];
    let table = use_case
        .execute(&tickers, &["PX_LAST".to_string(), "CRNCY".to_string()], &RequestColumns::new())
        .await
        .unwrap();

    assert_eq!(table.len(), 4);
    let tickers_back: Vec<&str> = table.rows.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tickers_back, tickers);
    assert_eq!(table.rows[1].values[0], FieldValue::Float(142.0));
    assert!(table.rows[2].values[0].is_security_not_found());
    assert_eq!(table.rows[3].values, table.rows[0].values);

    let px = table.column("px_last").unwrap();
    assert_eq!(px.len(), 4);
    assert_eq!(session.sent_requests().len(), 1);
}

#[tokio::test]
async fn reversed_vendor_order_still_aligns_to_input() {
    let (session, connection) =
        connect(ScriptedSession::new().with_responder(reversed_responder)).await;
    let use_case = ReferenceDataUseCase::new(connection);

    let tickers = [
        "IBM US Equity",
        "VOD LN Equity",
        "Unknown US Equity",
        "BARC LN Equity",
        "ibm us equity",
    ];
    let table = use_case
        .execute(&tickers, &["PX_LAST".to_string(), "CRNCY".to_string()], &RequestColumns::new())
        .await
        .unwrap();

    let sent = session.sent_requests();
    let Request::ReferenceData { securities, .. } = &sent[0].0 else {
        panic!("expected a reference request");
    };
    let sent_order: Vec<&str> = securities.iter().map(SecurityId::as_str).collect();
    assert_eq!(
        sent_order,
        ["IBM US EQUITY", "VOD LN EQUITY", "UNKNOWN US EQUITY", "BARC LN EQUITY"]
    );

    let tickers_back: Vec<&str> = table.rows.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tickers_back, tickers);

    assert_eq!(table.rows[0].values[0], FieldValue::Float(142.0));
    assert_eq!(table.rows[1].values[1], FieldValue::from("GBP"));
    assert!(table.rows[2].values[0].is_security_not_found());
    assert_eq!(table.rows[3].values[0], FieldValue::Float(10.0));
    assert_eq!(table.rows[4].values, table.rows[0].values);
}

#[tokio::test]
async fn per_security_overrides_split_requests() {
    let (session, connection) = connect(ScriptedSession::new().with_responder(responder)).await;
    let use_case = ReferenceDataUseCase::new(connection);

    let overrides = RequestColumns::new()
        .with_override("EQY_FUND_CRNCY", OverrideColumn::per_security(["USD", "EUR"]));
    let values = use_case
        .field(&["IBM US Equity", "IBM US Equity"], "PX_LAST", &overrides)
        .await
        .unwrap();

    assert_eq!(values, vec![FieldValue::Float(142.0), FieldValue::Float(130.5)]);
    assert_eq!(session.sent_requests().len(), 2);
}

#[tokio::test]
async fn bulk_rows_and_scalar_rejection() {
    let (_, connection) = connect(ScriptedSession::new().with_responder(responder)).await;
    let use_case = BulkDataUseCase::new(connection);

    let table = use_case
        .execute(&["IBM US Equity"], &["DVD_HIST".to_string()], &RequestColumns::new())
        .await
        .unwrap();
    assert!(!table.rows.is_empty());

    let err = use_case
        .execute(&["IBM US Equity"], &["PX_LAST".to_string()], &RequestColumns::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedField);
}

#[tokio::test]
async fn recorded_transcript_replays() {
    let fields = ["PX_LAST".to_string()];
    let tickers = ["IBM US Equity", "VOD LN Equity"];

    let (live_session, connection) = connect(ScriptedSession::new().with_responder(responder)).await;
    let live = ReferenceDataUseCase::new(connection)
        .execute(&tickers, &fields, &RequestColumns::new())
        .await
        .unwrap();

    let json = live_session.transcript().to_json().unwrap();
    let transcript = Transcript::from_json(&json).unwrap();
    let (_, replay_connection) = connect(ScriptedSession::from_transcript(transcript)).await;
    let replayed = ReferenceDataUseCase::new(replay_connection)
        .execute(&tickers, &fields, &RequestColumns::new())
        .await
        .unwrap();

    assert_eq!(live, replayed);
}
