//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define service metrics (requests, latency, query outcomes)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `shortener_requests_total` (counter): requests by method, status
//! - `shortener_request_duration_seconds` (histogram): latency distribution
//! - `shortener_queries_total` (counter): database calls by operation, outcome
//! - `shortener_query_duration_seconds` (histogram): database latency
//! - `shortener_timeouts_total`, `shortener_panics_total` (counters)
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels kept low-cardinality (no paths, no codes)

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics recorder"),
    }
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("shortener_requests_total", &labels).increment(1);
    histogram!("shortener_request_duration_seconds", &labels)
        .record(start_time.elapsed().as_secs_f64());
}

/// Middleware recording every response, including guard-produced ones.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

/// Record a database call observed by the query observer.
pub fn record_query(operation: &str, outcome: &str, duration: Duration) {
    let labels = [
        ("operation", operation.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("shortener_queries_total", &labels).increment(1);
    histogram!("shortener_query_duration_seconds", &labels).record(duration.as_secs_f64());
}

pub fn record_timeout() {
    counter!("shortener_timeouts_total").increment(1);
}

pub fn record_panic() {
    counter!("shortener_panics_total").increment(1);
}
