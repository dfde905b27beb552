//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_rejected_total` (counter): requests refused before forwarding, by reason
//! - `proxy_secret_refresh_total` (counter): header resolutions by outcome
//! - `proxy_custom_headers` (gauge): size of the last resolved header set

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("proxy_requests_total", "Proxied requests by method and status");
    describe_histogram!(
        "proxy_request_duration_seconds",
        "End-to-end request latency in seconds"
    );
    describe_counter!("proxy_rejected_total", "Requests refused before forwarding");
    describe_counter!(
        "proxy_secret_refresh_total",
        "Custom header resolutions by outcome"
    );
    describe_gauge!("proxy_custom_headers", "Headers in the last resolved set");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rejected(reason: &'static str) {
    counter!("proxy_rejected_total", "reason" => reason).increment(1);
}

pub fn record_secret_refresh(outcome: &'static str) {
    counter!("proxy_secret_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_custom_headers(count: usize) {
    gauge!("proxy_custom_headers").set(count as f64);
}
