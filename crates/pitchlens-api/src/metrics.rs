//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "pitchlens_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "pitchlens_http_request_duration_seconds";

    // Analysis pipeline metrics
    pub const ANALYSES_TOTAL: &str = "pitchlens_analyses_total";
    pub const ANALYSIS_DURATION_SECONDS: &str = "pitchlens_analysis_duration_seconds";
    pub const FILE_WAIT_SECONDS: &str = "pitchlens_file_wait_seconds";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "pitchlens_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an analysis outcome ("success" or an error kind).
pub fn record_analysis(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::ANALYSES_TOTAL, &labels).increment(1);
    histogram!(names::ANALYSIS_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record how long a remote file took to become ready.
pub fn record_file_wait(duration_secs: f64) {
    histogram!(names::FILE_WAIT_SECONDS).record(duration_secs);
}

/// Record a rate limit hit.
pub fn record_rate_limit_hit(path: &str) {
    let labels = [("path", path.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// HTTP metrics middleware.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
