//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. Pipeline metrics recorded by the worker
/// crate land in the same registry.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vtrack_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vtrack_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vtrack_http_requests_in_flight";

    pub const WS_CONNECTIONS_TOTAL: &str = "vtrack_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "vtrack_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "vtrack_ws_messages_sent_total";

    pub const UPLOADS_TOTAL: &str = "vtrack_uploads_total";
    pub const UPLOAD_BYTES: &str = "vtrack_upload_bytes";
}

/// Path segments that are followed by a task id.
const TASK_ROUTES: &[&str] = &["status", "download", "ws", "cleanup"];

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

pub fn record_ws_message_sent(status: &str) {
    let labels = [("status", status.to_string())];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

pub fn record_upload(extension: &str, bytes: u64, accepted: bool) {
    let labels = [
        ("extension", extension.to_string()),
        ("outcome", if accepted { "accepted" } else { "rejected" }.to_string()),
    ];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    if accepted {
        histogram!(names::UPLOAD_BYTES).record(bytes as f64);
    }
}

/// Collapse ids in a request path so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut prev = "";
    for segment in path.split('/') {
        let replaced = if !segment.is_empty() && TASK_ROUTES.contains(&prev) {
            ":task_id"
        } else if looks_like_id(segment) {
            ":id"
        } else {
            segment
        };
        out.push(replaced);
        prev = segment;
    }
    out.join("/")
}

fn looks_like_id(segment: &str) -> bool {
    let hex_id = segment.len() >= 16 && segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    let numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());
    hex_id || numeric
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());

    response
}
