//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vcast_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vcast_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vcast_http_requests_in_flight";

    // Submission metrics
    pub const EXPORTS_SUBMITTED_TOTAL: &str = "vcast_exports_submitted_total";
    pub const EXPORTS_REJECTED_TOTAL: &str = "vcast_exports_rejected_total";
    pub const QUEUE_PENDING: &str = "vcast_queue_pending";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "vcast_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an accepted export.
pub fn record_export_submitted(kind: &'static str) {
    counter!(names::EXPORTS_SUBMITTED_TOTAL, "kind" => kind).increment(1);
}

/// Record a rejected submission.
pub fn record_export_rejected(reason: &'static str) {
    counter!(names::EXPORTS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Update the pending jobs gauge.
pub fn set_queue_pending(count: u64) {
    gauge!(names::QUEUE_PENDING).set(count as f64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    static UUID: OnceLock<Regex> = OnceLock::new();
    static USER: OnceLock<Regex> = OnceLock::new();
    static EXPORT: OnceLock<Regex> = OnceLock::new();

    let uuid = UUID.get_or_init(|| {
        Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
    });
    let user = USER.get_or_init(|| Regex::new(r"/users/[^/]+").unwrap());
    let export = EXPORT.get_or_init(|| Regex::new(r"/exports/[^/]+").unwrap());

    let path = uuid.replace_all(path, ":id");
    let path = user.replace_all(&path, "/users/:user_id");
    let path = export.replace_all(&path, "/exports/:job_id");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
