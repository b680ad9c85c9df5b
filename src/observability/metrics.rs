//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_attempts_total` (counter): attempts by transport, outcome, status
//! - `relay_attempt_duration_seconds` (histogram): per-attempt latency
//! - `relay_in_flight` (gauge): dispatches currently in flight
//! - `relay_retries_total` (counter): retry waits entered
//! - `relay_runs_total` (counter): finished runs by terminal state
//! - `relay_global_stops_total` (counter) and `relay_stop_cancelled_handles_total`
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

use crate::resilience::retries::TerminalState;
use crate::transport::types::TransportKind;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_attempt(transport: TransportKind, status: u16, ok: bool, elapsed: Duration) {
    let outcome = if ok { "ok" } else { "failed" };
    counter!(
        "relay_attempts_total",
        "transport" => transport.as_str(),
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_attempt_duration_seconds", "transport" => transport.as_str())
        .record(elapsed.as_secs_f64());
}

pub fn record_in_flight(count: usize) {
    gauge!("relay_in_flight").set(count as f64);
}

pub fn record_retry() {
    counter!("relay_retries_total").increment(1);
}

pub fn record_run(terminal: TerminalState) {
    counter!("relay_runs_total", "terminal" => terminal.as_str()).increment(1);
}

pub fn record_global_stop(cancelled: usize) {
    counter!("relay_global_stops_total").increment(1);
    counter!("relay_stop_cancelled_handles_total").increment(cancelled as u64);
}
