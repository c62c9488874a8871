//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): pipeline latency
//! - `gateway_rejections_total` (counter): rejections by error code
//! - `gateway_rate_limited_total` (counter): 429s by endpoint class
//! - `gateway_dependency_failures_total` (counter): by component, policy
//! - `gateway_sessions_total` (counter): session lifecycle events
//! - `gateway_health_probe_duration_seconds` (histogram): by probe

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(code: &'static str) {
    ::metrics::counter!("gateway_rejections_total", "code" => code).increment(1);
}

pub fn record_rate_limited(class: &'static str) {
    ::metrics::counter!("gateway_rate_limited_total", "class" => class).increment(1);
}

pub fn record_dependency_failure(component: &'static str, policy: &'static str) {
    ::metrics::counter!(
        "gateway_dependency_failures_total",
        "component" => component,
        "policy" => policy
    )
    .increment(1);
}

pub fn record_session_event(event: &'static str) {
    ::metrics::counter!("gateway_sessions_total", "event" => event).increment(1);
}

pub fn record_probe(probe: &'static str, start: Instant) {
    ::metrics::histogram!("gateway_health_probe_duration_seconds", "probe" => probe)
        .record(start.elapsed().as_secs_f64());
}
