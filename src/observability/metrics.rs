//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (sends, breaker transitions, consumed messages, reads)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `gateway_sends_total` (counter): component, endpoint, outcome
//! - `gateway_breaker_transitions_total` (counter): component, state
//! - `gateway_messages_total` (counter): endpoint, outcome
//! - `gateway_blob_reads_total` (counter): endpoint, outcome
//! - `gateway_requests_total` (counter): method, status
//! - `gateway_request_duration_seconds` (histogram): method, status
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed, so tests need no setup
//! - Labels stay low-cardinality: roles and outcomes, never ids

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// One attempt by a dual-endpoint sender.
pub fn record_send(component: &'static str, endpoint: &'static str, outcome: &'static str) {
    metrics::counter!(
        "gateway_sends_total",
        "component" => component,
        "endpoint" => endpoint,
        "outcome" => outcome
    )
    .increment(1);
}

/// A circuit breaker entered `state`.
pub fn record_breaker_transition(component: &str, state: &'static str) {
    metrics::counter!(
        "gateway_breaker_transitions_total",
        "component" => component.to_string(),
        "state" => state
    )
    .increment(1);
}

/// A consumed message reached a terminal disposition.
pub fn record_message(endpoint: &'static str, outcome: &'static str) {
    metrics::counter!("gateway_messages_total", "endpoint" => endpoint, "outcome" => outcome)
        .increment(1);
}

/// A blob read attempt against one endpoint.
pub fn record_blob_read(endpoint: &'static str, outcome: &'static str) {
    metrics::counter!("gateway_blob_reads_total", "endpoint" => endpoint, "outcome" => outcome)
        .increment(1);
}

/// One HTTP request served by the public API.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}
