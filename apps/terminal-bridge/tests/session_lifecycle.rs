//! Session Lifecycle Integration Tests
//!
//! Start-up handshakes, refused services, shutdown and configuration.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use terminal_bridge::application::ports::Service;
use terminal_bridge::application::services::Connection;
use terminal_bridge::application::use_cases::SearchUseCase;
use terminal_bridge::domain::overrides::RequestColumns;
use terminal_bridge::{BridgeConfig, ErrorCode, ReferenceDataUseCase, ScriptedSession};

const TIMEOUT: Duration = Duration::from_millis(10);

#[tokio::test]
async fn start_opens_every_service() {
    let session = Arc::new(ScriptedSession::new());
    let connection = Connection::start(Arc::clone(&session), TIMEOUT).await.unwrap();

    assert_eq!(session.opened_services(), Service::ALL.to_vec());
    assert_eq!(connection.timeout(), TIMEOUT);
    assert_eq!(connection.flush(), 0);
}

#[tokio::test]
async fn refused_start_and_service_fail() {
    let refused = Arc::new(ScriptedSession::new().refuse_start());
    let err = Connection::start(refused, TIMEOUT).await.err().unwrap();
    assert_eq!(err.code(), ErrorCode::SessionStartFailed);

    let no_instruments = Arc::new(ScriptedSession::new().refuse_service(Service::Instruments));
    let err = Connection::start(no_instruments, TIMEOUT).await.err().unwrap();
    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
}

#[tokio::test]
async fn attach_requires_drained_queue() {
    let session = Arc::new(ScriptedSession::new().already_started());
    let connection = Connection::attach(Arc::clone(&session), TIMEOUT).await.unwrap();

    let values = SearchUseCase::new(Arc::new(connection))
        .grid("COMDTY:NGFLOW")
        .await
        .unwrap();
    assert!(values.is_empty());
}

#[tokio::test]
async fn stopped_session_rejects_requests() {
    let session = Arc::new(ScriptedSession::new());
    let connection = Arc::new(Connection::start(Arc::clone(&session), TIMEOUT).await.unwrap());
    connection.stop().await.unwrap();
    assert!(session.is_stopped());

    let err = ReferenceDataUseCase::new(connection)
        .field(&["IBM US Equity"], "PX_LAST", &RequestColumns::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SessionFailure);
}

#[test]
fn config_from_variables() -> anyhow::Result<()> {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("TERMINAL_BRIDGE_HOST", "10.0.0.5"),
        ("TERMINAL_BRIDGE_TIMEOUT_MS", "2500"),
    ]);
    let config = BridgeConfig::from_lookup(|key| vars.get(key).map(ToString::to_string))?;

    let options = config.session_options();
    assert_eq!(options.host, "10.0.0.5");
    assert_eq!(options.timeout, Duration::from_millis(2500));
    assert!(config.exchange_directory()?.get("LN").is_some());

    let err = BridgeConfig::from_lookup(|key| (key == "TERMINAL_BRIDGE_PORT").then(|| "port".to_string()));
    assert!(err.is_err());
    Ok(())
}
