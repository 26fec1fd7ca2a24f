//! Upload, submission, status, download and cleanup handlers.

use std::io::ErrorKind;
use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, Request};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};
use uuid::Uuid;

use vtrack_models::{Task, TaskId, TaskStatus, TrackingRequest, TrackingResponse, UploadResponse};
use vtrack_worker::{is_safe_id, PipelineError};

use crate::config::{allowed_extension, ALLOWED_EXTENSIONS};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the video.
const FILE_FIELD: &str = "file";

/// Status record as returned by the status endpoint and pushed over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            progress: task.progress,
            message: task.message,
            result_locator: task.result_locator,
            error: task.error,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub message: String,
    /// Directories actually removed by this call
    pub removed: usize,
}

/// Store an uploaded video under a fresh file id.
pub async fn upload_video(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let Some(extension) = allowed_extension(&filename) else {
            metrics::record_upload("unsupported", 0, false);
            return Err(ApiError::bad_request(format!(
                "File type not allowed. Supported formats: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        };

        let file_id = Uuid::new_v4().to_string();
        let path = state.layout().upload_path(&file_id, &extension);
        let written = match save_field(&mut field, &path, state.config.max_file_size).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    if remove_err.kind() != ErrorKind::NotFound {
                        warn!(path = %path.display(), "Failed to remove rejected upload: {}", remove_err);
                    }
                }
                metrics::record_upload(&extension, 0, false);
                return Err(e);
            }
        };

        metrics::record_upload(&extension, written, true);
        info!(file_id = %file_id, filename = %filename, bytes = written, "Video uploaded");
        return Ok(Json(UploadResponse {
            success: true,
            message: "File uploaded successfully".to_string(),
            file_id,
            filename,
        }));
    }

    Err(ApiError::bad_request("No file provided"))
}

/// Stream one multipart field to disk, enforcing the size cap as bytes arrive.
async fn save_field(field: &mut Field<'_>, path: &FsPath, limit: usize) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        written += chunk.len() as u64;
        if written > limit as u64 {
            return Err(ApiError::bad_request(format!(
                "File size too large. Maximum size: {:.1}MB",
                limit as f64 / (1024.0 * 1024.0)
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(written)
}

/// Start a tracking run over a previously uploaded video.
pub async fn start_tracking(
    State(state): State<AppState>,
    payload: Result<Json<TrackingRequest>, JsonRejection>,
) -> ApiResult<Json<TrackingResponse>> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| PipelineError::InvalidRequest(e.to_string()))?;

    let video = state
        .layout()
        .find_upload(&request.file_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video file not found"))?;

    let submission = state.orchestrator.submit(video, request).await?;
    Ok(Json(TrackingResponse {
        task_id: submission.task_id,
        status: submission.status,
    }))
}

pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let task = load_task(&state, &task_id).await?;
    Ok(Json(task.into()))
}

/// Stream the output video of a completed task. Range requests are honoured.
pub async fn download_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    request: Request<Body>,
) -> ApiResult<Response> {
    let task = load_task(&state, &task_id).await?;
    if task.status != TaskStatus::Completed {
        return Err(ApiError::bad_request("Task not completed"));
    }

    let path = state.layout().output_path(&task.id);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(ApiError::not_found("Result video not found")),
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ApiError::not_found("Result video not found")),
        Err(e) => return Err(e.into()),
    }

    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    let disposition = format!("attachment; filename=\"tracked_video_{}.mp4\"", task.id);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Remove a task's temporary frames and annotated frames. Idempotent.
pub async fn cleanup_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<CleanupResponse>> {
    let removed = state.orchestrator.cleanup(&TaskId::from_string(task_id.as_str())).await?;
    info!(task_id = %task_id, removed, "Cleanup requested");
    Ok(Json(CleanupResponse {
        message: format!("Cleanup completed for task {}", task_id),
        removed,
    }))
}

pub(crate) async fn load_task(state: &AppState, task_id: &str) -> ApiResult<Task> {
    if !is_safe_id(task_id) {
        return Err(ApiError::not_found("Task not found"));
    }
    state
        .store()
        .get(&TaskId::from_string(task_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))
}
