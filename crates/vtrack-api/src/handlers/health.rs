//! Health, readiness and deployment info.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use vtrack_models::PromptType;

use crate::config::ALLOWED_EXTENSIONS;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Liveness probe. Never touches dependencies.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub store: CheckStatus,
    pub inference: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(started: Instant) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness probe: task store ping plus inference service health.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let store = {
        let started = Instant::now();
        match state.store().ping().await {
            Ok(()) => CheckStatus::ok(started),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let inference = {
        let started = Instant::now();
        if state.orchestrator.inference().is_healthy().await {
            CheckStatus::ok(started)
        } else {
            CheckStatus::error("inference service unhealthy")
        }
    };

    let all_ok = store.is_ok() && inference.is_ok();
    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks { store, inference },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

#[derive(Serialize)]
pub struct InfoResponse {
    pub api_version: String,
    pub max_file_size_mb: f64,
    pub supported_formats: Vec<String>,
    pub default_prompt_type: PromptType,
    pub points_per_object: usize,
    pub output_fps: f64,
    pub dedup_enabled: bool,
}

/// Limits and defaults a client needs before uploading.
pub async fn api_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let pipeline = state.orchestrator.config();
    Json(InfoResponse {
        api_version: env!("CARGO_PKG_VERSION").to_string(),
        max_file_size_mb: state.config.max_file_size as f64 / (1024.0 * 1024.0),
        supported_formats: ALLOWED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        default_prompt_type: pipeline.default_prompt_type,
        points_per_object: pipeline.points_per_object,
        output_fps: pipeline.output_fps,
        dedup_enabled: pipeline.dedup_enabled,
    })
}
