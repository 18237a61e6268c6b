//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that renders the `/metrics` page.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "tubegate_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "tubegate_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "tubegate_http_requests_in_flight";

    // Download metrics (pipeline byte and process metrics live in tubegate-media)
    pub const DOWNLOADS_STARTED_TOTAL: &str = "tubegate_downloads_started_total";
    pub const DOWNLOADS_FAILED_TOTAL: &str = "tubegate_downloads_failed_total";
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

/// Record a download whose first audio byte was produced.
pub fn record_download_started() {
    counter!(names::DOWNLOADS_STARTED_TOTAL).increment(1);
}

/// Record a download that failed before streaming.
pub fn record_download_failed(kind: &'static str) {
    counter!(names::DOWNLOADS_FAILED_TOTAL, "kind" => kind).increment(1);
}

static NUMERIC_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[0-9]+(/|$)").expect("valid regex"));
static TOKEN_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[A-Za-z0-9_-]{16,}(/|$)").expect("valid regex"));

/// Sanitize an unmatched path for metrics labels (remove ids, etc.).
fn sanitize_path(path: &str) -> String {
    let path = NUMERIC_SEGMENT.replace_all(path, "/:id$1");
    let path = TOKEN_SEGMENT.replace_all(&path, "/:token$1");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => sanitize_path(request.uri().path()),
    };
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
