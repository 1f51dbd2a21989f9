//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by method, status or error class
//! - `relay_request_duration_seconds` (histogram): latency by method
//! - `relay_cache_events_total` (counter): hit, stale, miss, store, revalidated
//! - `relay_retries_total` (counter): retry attempts

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> bool {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            tracing::info!(address = %addr, "Metrics endpoint listening");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install metrics recorder");
            false
        }
    }
}

pub fn record_request(method: &str, status: &str, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    counter!(
        "relay_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_request_duration_seconds", "method" => method.to_string()).record(elapsed);
}

pub fn record_cache_event(event: &'static str) {
    counter!("relay_cache_events_total", "event" => event).increment(1);
}

pub fn record_retry() {
    counter!("relay_retries_total").increment(1);
}
