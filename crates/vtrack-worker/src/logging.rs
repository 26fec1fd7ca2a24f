//! Structured task logging.
//!
//! Every line carries the task id so a single run can be followed through
//! interleaved output. Checkpoints, stage timings and detections are logged
//! as fields rather than free text so they can be filtered in JSON output.

use std::path::Path;

use tracing::{error, info, warn, Span};
use vtrack_models::{Checkpoint, DetectionResult, PromptType, TaskId};

/// Logger bound to one tracking run.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    prompt_type: PromptType,
}

impl TaskLogger {
    /// Create a logger for `task_id` running in `prompt_type` mode.
    pub fn new(task_id: &TaskId, prompt_type: PromptType) -> Self {
        Self {
            task_id: task_id.to_string(),
            prompt_type,
        }
    }

    /// Log the inputs of a run as it starts.
    pub fn log_start(&self, prompt: &str, video: &Path) {
        info!(
            task_id = %self.task_id,
            prompt_type = %self.prompt_type,
            prompt,
            video = %video.display(),
            "Tracking started"
        );
    }

    /// Log a checkpoint the store has accepted.
    pub fn log_checkpoint(&self, checkpoint: Checkpoint) {
        info!(
            task_id = %self.task_id,
            checkpoint = ?checkpoint,
            progress = checkpoint.progress(),
            "{}", checkpoint.message()
        );
    }

    /// Log a finished stage with its wall time.
    pub fn log_stage(&self, stage: &str, elapsed_secs: f64) {
        info!(
            task_id = %self.task_id,
            stage,
            elapsed_secs,
            "Stage finished: {}", stage
        );
    }

    /// Log the object set fixed on the seed frame.
    pub fn log_detections(&self, detections: &[DetectionResult]) {
        let objects = detections
            .iter()
            .map(|d| format!("{}#{} ({:.2})", d.label, d.object_id, d.confidence))
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            task_id = %self.task_id,
            count = detections.len(),
            "Detected objects: {}", objects
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(task_id = %self.task_id, "{}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(task_id = %self.task_id, "Task warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(task_id = %self.task_id, "Task error: {}", message);
    }

    /// Log the stage that ended the run and where progress stopped.
    pub fn log_failure(&self, stage: &str, progress: Option<f32>, error: &str) {
        error!(
            task_id = %self.task_id,
            stage,
            progress = progress.unwrap_or(0.0),
            "Tracking failed: {}", error
        );
    }

    /// Log a completed run.
    pub fn log_completion(&self, elapsed_secs: f64, result_locator: &str) {
        info!(
            task_id = %self.task_id,
            elapsed_secs,
            result = result_locator,
            "Tracking completed"
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Span wrapping one whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "tracking",
            task_id = %self.task_id,
            prompt_type = %self.prompt_type
        )
    }
}
