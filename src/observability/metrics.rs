//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_sessions_total` (counter): finished sessions by user, outcome
//! - `gateway_active_sessions` (gauge): live sessions per user
//! - `gateway_relay_bytes_total` (counter): relayed bytes by user, direction
//! - `gateway_handshake_failures_total` (counter): rejected handshakes by reason
//! - `gateway_refresh_total` (counter): renewal attempts by slot, outcome
//! - `gateway_publish_requests_total` (counter): publish HTTP responses by status
//!
//! Without an installed recorder every call below is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session(user: &str, outcome: &'static str) {
    metrics::counter!("gateway_sessions_total", "user" => user.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn set_active_sessions(user: &str, active: u64) {
    metrics::gauge!("gateway_active_sessions", "user" => user.to_string()).set(active as f64);
}

pub fn record_relay_bytes(user: &str, direction: &'static str, bytes: u64) {
    if bytes == 0 {
        return;
    }
    metrics::counter!("gateway_relay_bytes_total", "user" => user.to_string(), "direction" => direction)
        .increment(bytes);
}

pub fn record_handshake_failure(reason: &'static str) {
    metrics::counter!("gateway_handshake_failures_total", "reason" => reason).increment(1);
}

pub fn record_refresh(slot: usize, outcome: &'static str) {
    metrics::counter!("gateway_refresh_total", "slot" => slot.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_publish_request(status: u16) {
    metrics::counter!("gateway_publish_requests_total", "status" => status.to_string()).increment(1);
}
