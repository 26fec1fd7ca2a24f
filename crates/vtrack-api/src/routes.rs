//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    api_info, cleanup_task, download_result, health, ready, start_tracking, task_status, upload_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, mask_server_errors, request_id, request_logging, security_headers};
use crate::state::AppState;
use crate::ws::ws_status;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let body_limit = state.config.max_body_size();
    let production = state.config.is_production();

    let upload_routes = Router::new()
        .route("/upload", post(upload_video))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit));

    let api_routes = Router::new()
        .merge(upload_routes)
        .route("/track", post(start_tracking))
        .route("/status/:task_id", get(task_status))
        .route("/ws/:task_id", get(ws_status))
        .route("/download/:task_id", get(download_result))
        .route("/cleanup/:task_id", delete(cleanup_task))
        .route("/info", get(api_info));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn_with_state(production, mask_server_errors))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
