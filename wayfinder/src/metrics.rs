//! Client observability metrics
//!
//! Prometheus-compatible metrics for:
//! - Discovery request duration and outcome per endpoint
//! - Retry attempts and exhausted calls
//! - Session rotations
//! - Resolver refresh outcomes and endpoint counts

use std::time::{Duration, Instant};

/// Record discovery request duration
pub fn record_request_duration(request: &str, endpoint: &str, duration: Duration) {
    metrics::histogram!(
        "wayfinder_request_duration_seconds",
        "request" => request.to_string(),
        "endpoint" => endpoint.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a request that reached a server, labelled by HTTP status
pub fn record_request_status(request: &str, endpoint: &str, status: u16) {
    metrics::counter!(
        "wayfinder_requests_total",
        "request" => request.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record a request that failed below HTTP
pub fn record_request_error(request: &str, endpoint: &str, error_type: &str) {
    metrics::counter!(
        "wayfinder_requests_total",
        "request" => request.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => "error",
    )
    .increment(1);

    metrics::counter!(
        "wayfinder_request_errors_total",
        "request" => request.to_string(),
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Record one attempt beyond the first inside a logical call
pub fn record_retry(request: &str) {
    metrics::counter!(
        "wayfinder_retries_total",
        "request" => request.to_string(),
    )
    .increment(1);
}

/// Record a logical call that failed after trying every candidate
pub fn record_exhausted(request: &str, attempts: usize) {
    metrics::counter!(
        "wayfinder_endpoints_exhausted_total",
        "request" => request.to_string(),
    )
    .increment(1);

    metrics::histogram!("wayfinder_exhausted_attempts").record(attempts as f64);
}

/// Record a followed redirect
pub fn record_redirect(request: &str) {
    metrics::counter!(
        "wayfinder_redirects_total",
        "request" => request.to_string(),
    )
    .increment(1);
}

/// Record a session rotation of a sessioned client
pub fn record_session_rotation(pipeline: &str) {
    metrics::counter!(
        "wayfinder_session_rotations_total",
        "pipeline" => pipeline.to_string(),
    )
    .increment(1);
}

/// Record a resolver refresh outcome
pub fn record_resolver_refresh(resolver: &str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    metrics::counter!(
        "wayfinder_resolver_refresh_total",
        "resolver" => resolver.to_string(),
        "status" => status,
    )
    .increment(1);

    metrics::histogram!(
        "wayfinder_resolver_refresh_duration_seconds",
        "resolver" => resolver.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Update the gauge of currently known endpoints
pub fn record_endpoint_count(resolver: &str, count: usize) {
    metrics::gauge!(
        "wayfinder_resolver_endpoints",
        "resolver" => resolver.to_string(),
    )
    .set(count as f64);
}

/// Record quarantine size of a retryable client
pub fn record_quarantine_size(size: usize) {
    metrics::gauge!("wayfinder_quarantined_endpoints").set(size as f64);
}

/// Guard for timing discovery requests
pub struct RequestTimer {
    request: &'static str,
    endpoint: String,
    start: Instant,
}

impl RequestTimer {
    /// Start timing a request
    pub fn new(request: &'static str, endpoint: &str) -> Self {
        Self {
            request,
            endpoint: endpoint.to_string(),
            start: Instant::now(),
        }
    }

    /// Record the returned status and duration
    pub fn status(self, status: u16) {
        record_request_duration(self.request, &self.endpoint, self.start.elapsed());
        record_request_status(self.request, &self.endpoint, status);
    }

    /// Record error and duration
    pub fn error(self, error_type: &str) {
        record_request_duration(self.request, &self.endpoint, self.start.elapsed());
        record_request_error(self.request, &self.endpoint, error_type);
    }
}
