//! Axum HTTP API server for video object tracking.
//!
//! This crate provides:
//! - Upload, submission, status, download and cleanup endpoints
//! - WebSocket status push
//! - Liveness/readiness probes and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
