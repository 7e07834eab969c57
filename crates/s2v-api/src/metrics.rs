//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "s2v_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "s2v_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "s2v_http_requests_in_flight";
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

/// Replace entity ids in a path with their route parameter names.
fn sanitize_path(path: &str) -> String {
    let mut previous = "";
    path.split('/')
        .map(|segment| {
            let placeholder = match previous {
                "project" => Some(":project_id"),
                "pdfslideimages" => Some(":batch_id"),
                "videosegment" => Some(":segment_id"),
                _ => None,
            };
            previous = segment;
            match placeholder {
                Some(p) if !segment.is_empty() => p,
                _ => segment,
            }
        })
        .collect::<Vec<_>>()
        .join("/")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/v1/project/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/project/:project_id"
        );
        assert_eq!(
            sanitize_path("/api/v1/project/abc/videosegment/def/generate"),
            "/api/v1/project/:project_id/videosegment/:segment_id/generate"
        );
        assert_eq!(
            sanitize_path("/api/v1/project/abc/pdfslideimages/b1"),
            "/api/v1/project/:project_id/pdfslideimages/:batch_id"
        );
        assert_eq!(sanitize_path("/api/v1/project"), "/api/v1/project");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
