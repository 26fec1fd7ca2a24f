//! Task records and the task state machine.
//!
//! A [`Task`] is the only record shared between the pipeline and status
//! observers. Every mutation goes through [`Task::advance`], [`Task::complete`]
//! or [`Task::fail`], which enforce the legal status transitions and keep
//! progress non-decreasing.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::checkpoint::Checkpoint;
use crate::error::{ModelError, ModelResult};

/// Unique identifier for a tracking task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, pipeline not yet started
    #[default]
    Pending,
    /// Pipeline is running
    Processing,
    /// Output video is available
    Completed,
    /// A stage failed; see `error`
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Completed and Failed are final for a task id.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether `next` is reachable from `self` in one write.
    ///
    /// Processing may be rewritten with itself while checkpoints advance.
    /// A task can only fail once it has started.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted task record, also the payload of status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Progress percentage (0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,

    /// Human-readable description of the current step
    #[serde(default)]
    pub message: String,

    /// Where the output video can be fetched once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_locator: Option<String>,

    /// Captured failure text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task at the queued checkpoint.
    pub fn new(id: TaskId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            progress: Some(Checkpoint::Queued.progress()),
            message: Checkpoint::Queued.message().to_string(),
            result_locator: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the task to a non-final checkpoint.
    ///
    /// Sets status to Processing. Use [`Task::complete`] for the final
    /// checkpoint.
    pub fn advance(&mut self, checkpoint: Checkpoint) -> ModelResult<()> {
        if checkpoint == Checkpoint::Completed {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Completed,
            });
        }
        self.check_transition(TaskStatus::Processing)?;
        self.check_progress(checkpoint.progress())?;

        self.status = TaskStatus::Processing;
        self.progress = Some(checkpoint.progress());
        self.message = checkpoint.message().to_string();
        self.touch();
        Ok(())
    }

    /// Mark the task completed with the location of its output.
    pub fn complete(&mut self, result_locator: impl Into<String>) -> ModelResult<()> {
        self.check_transition(TaskStatus::Completed)?;
        self.check_progress(Checkpoint::Completed.progress())?;

        self.status = TaskStatus::Completed;
        self.progress = Some(Checkpoint::Completed.progress());
        self.message = Checkpoint::Completed.message().to_string();
        self.result_locator = Some(result_locator.into());
        self.touch();
        Ok(())
    }

    /// Mark the task failed. Progress is left where the failing stage found it.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.check_transition(TaskStatus::Failed)?;

        let error = error.into();
        self.status = TaskStatus::Failed;
        self.message = format!("Processing failed: {}", error);
        self.error = Some(error);
        self.result_locator = None;
        self.touch();
        Ok(())
    }

    fn check_transition(&self, next: TaskStatus) -> ModelResult<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }

    fn check_progress(&self, next: f32) -> ModelResult<()> {
        match self.progress {
            Some(current) if next < current => Err(ModelError::ProgressRegression { current, next }),
            _ => Ok(()),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
