//! Prometheus Metrics Module
//!
//! Session traffic counters for monitoring an embedding application.
//!
//! # Metrics Categories
//!
//! - **Requests**: Requests sent by vendor request name
//! - **Events**: Events received by event kind
//! - **Data quality**: Securities the vendor could not resolve
//! - **Batching**: Round-trips per call and drain latency
//!
//! The `metrics` macros are no-ops until a recorder is installed, so library
//! callers pay nothing unless they call [`init_metrics`].

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the handle installed earlier.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

const REQUESTS_SENT: &str = "terminal_bridge_requests_sent_total";
const EVENTS_RECEIVED: &str = "terminal_bridge_events_received_total";
const SECURITY_ERRORS: &str = "terminal_bridge_security_errors_total";
const ROUND_TRIPS: &str = "terminal_bridge_round_trips";
const DRAIN_SECONDS: &str = "terminal_bridge_drain_seconds";

fn register_metrics() {
    describe_counter!(REQUESTS_SENT, "Total requests sent to the terminal");
    describe_counter!(EVENTS_RECEIVED, "Total events received from the terminal");
    describe_counter!(
        SECURITY_ERRORS,
        "Total securities the terminal could not resolve"
    );
    describe_histogram!(ROUND_TRIPS, "Round-trips issued per bridge call");
    describe_histogram!(DRAIN_SECONDS, "Time spent draining response events");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a request sent to the terminal.
pub fn record_request_sent(request: &'static str) {
    counter!(REQUESTS_SENT, "request" => request).increment(1);
}

/// Record an event received from the terminal.
pub fn record_event_received(kind: &'static str) {
    counter!(EVENTS_RECEIVED, "event" => kind).increment(1);
}

/// Record securities the terminal could not resolve.
pub fn record_security_errors(count: usize) {
    if count > 0 {
        counter!(SECURITY_ERRORS).increment(u64::try_from(count).unwrap_or(u64::MAX));
    }
}

/// Record the number of round-trips a call needed.
#[allow(clippy::cast_precision_loss)]
pub fn record_round_trips(call: &'static str, count: usize) {
    histogram!(ROUND_TRIPS, "call" => call).record(count as f64);
}

/// Record how long a drain loop took.
pub fn record_drain_duration(duration: Duration) {
    histogram!(DRAIN_SECONDS).record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
