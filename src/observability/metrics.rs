//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mirror_requests_total` (counter): requests by method, status
//! - `mirror_request_duration_seconds` (histogram): end-to-end latency
//! - `mirror_rewrites_total` (counter): textual bodies by kind, outcome
//! - `mirror_sessions_issued_total` (counter): fresh session tokens
//! - `mirror_upstream_errors_total` (counter): failed upstream calls by cause
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    ::metrics::counter!("mirror_requests_total", "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    ::metrics::histogram!("mirror_request_duration_seconds", "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}

/// `outcome` is one of `rewritten`, `unchanged`, `lossy`, `skipped`.
pub fn record_rewrite(kind: &'static str, outcome: &'static str) {
    ::metrics::counter!("mirror_rewrites_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_session_issued() {
    ::metrics::counter!("mirror_sessions_issued_total").increment(1);
}

pub fn record_upstream_error(cause: &'static str) {
    ::metrics::counter!("mirror_upstream_errors_total", "cause" => cause).increment(1);
}
