//! Metrics collection and exposition.
//!
//! # Metrics
//! - `connector_sockets_open` (gauge): sockets registered and open
//! - `connector_requests_total` (counter): forwarded requests by outcome
//! - `connector_request_duration_seconds` (histogram): time from preamble to completion
//! - `connector_protocol_violations_total` (counter): sockets closed with 1002
//! - `connector_transport_errors_total` (counter): sockets closed with 1011
//! - `connector_body_bytes_total` (counter): body bytes by direction
//! - `connector_reconnects_total` (counter): reconnect attempts by router

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_socket_open() {
    metrics::gauge!("connector_sockets_open").increment(1.0);
}

pub fn record_socket_closed() {
    metrics::gauge!("connector_sockets_open").decrement(1.0);
}

/// Record a finished request with its outcome label.
pub fn record_request(outcome: &'static str, started: Instant) {
    metrics::counter!("connector_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("connector_request_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_protocol_violation() {
    metrics::counter!("connector_protocol_violations_total").increment(1);
}

pub fn record_transport_error() {
    metrics::counter!("connector_transport_errors_total").increment(1);
}

/// `direction` is "request" or "response".
pub fn record_body_bytes(direction: &'static str, bytes: usize) {
    metrics::counter!("connector_body_bytes_total", "direction" => direction)
        .increment(bytes as u64);
}

pub fn record_reconnect(router: &str) {
    metrics::counter!("connector_reconnects_total", "router" => router.to_string()).increment(1);
}
