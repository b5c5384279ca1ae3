//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): admissions refused, by reason
//! - `gateway_path_rejections_total` (counter): refused paths, by reason
//! - `gateway_audit_records_total` (counter): audit records, by outcome
//! - `gateway_audit_failures_total` (counter): audit sink write failures
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(reason: &'static str) {
    counter!("gateway_rate_limited_total", "reason" => reason).increment(1);
}

pub fn record_path_rejected(reason: &'static str) {
    counter!("gateway_path_rejections_total", "reason" => reason).increment(1);
}

pub fn record_audit(outcome: &'static str) {
    counter!("gateway_audit_records_total", "outcome" => outcome).increment(1);
}

pub fn record_audit_failure() {
    counter!("gateway_audit_failures_total").increment(1);
}
