//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_connections_total` (counter): connections accepted
//! - `gateway_connections_active` (gauge): current connection count
//! - `gateway_events_total` (counter, label `outcome`): dispatched events
//! - `gateway_event_duration_seconds` (histogram): handler latency
//! - `gateway_forward_requests_total` (counter, labels `prefix`, `status`)
//! - `gateway_forward_errors_total` (counter, label `kind`)
//! - `gateway_forward_duration_seconds` (histogram, label `prefix`)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const CONNECTIONS_TOTAL: &str = "gateway_connections_total";
pub const CONNECTIONS_ACTIVE: &str = "gateway_connections_active";
pub const EVENTS_TOTAL: &str = "gateway_events_total";
pub const EVENT_DURATION_SECONDS: &str = "gateway_event_duration_seconds";
pub const FORWARD_REQUESTS_TOTAL: &str = "gateway_forward_requests_total";
pub const FORWARD_ERRORS_TOTAL: &str = "gateway_forward_errors_total";
pub const FORWARD_DURATION_SECONDS: &str = "gateway_forward_duration_seconds";

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn connection_opened() {
    ::metrics::counter!(CONNECTIONS_TOTAL).increment(1);
    ::metrics::gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn connection_closed() {
    ::metrics::gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

pub fn record_event(outcome: &'static str, start: Instant) {
    ::metrics::counter!(EVENTS_TOTAL, "outcome" => outcome).increment(1);
    ::metrics::histogram!(EVENT_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
}

pub fn record_forward(prefix: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        FORWARD_REQUESTS_TOTAL,
        "prefix" => prefix.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!(FORWARD_DURATION_SECONDS, "prefix" => prefix.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_forward_error(kind: &'static str) {
    ::metrics::counter!(FORWARD_ERRORS_TOTAL, "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        connection_opened();
        record_event("ok", Instant::now());
        record_forward("/api", 200, Instant::now());
        record_forward_error("connect");
        connection_closed();
    }

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        for name in [
            CONNECTIONS_TOTAL,
            CONNECTIONS_ACTIVE,
            EVENTS_TOTAL,
            EVENT_DURATION_SECONDS,
            FORWARD_REQUESTS_TOTAL,
            FORWARD_ERRORS_TOTAL,
            FORWARD_DURATION_SECONDS,
        ] {
            assert!(name.starts_with("gateway_"));
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
