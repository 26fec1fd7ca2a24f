//! Pipeline error types.

use thiserror::Error;

use vtrack_inference::InferenceError;
use vtrack_media::MediaError;
use vtrack_models::ModelError;
use vtrack_store::StoreError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Frame extraction failed: {0}")]
    Extraction(#[source] MediaError),

    #[error("Video contains no frames")]
    NoFrames,

    #[error("Tracker initialization failed: {0}")]
    TrackerInit(#[source] InferenceError),

    #[error("Object detection failed: {0}")]
    Detection(#[source] InferenceError),

    #[error("No objects detected with prompt: {prompt}")]
    DetectionEmpty { prompt: String },

    #[error("Tracker seeding failed: {0}")]
    Seeding(String),

    #[error("Tracking propagation failed: {0}")]
    Propagation(String),

    #[error("Annotation failed: {0}")]
    Annotation(String),

    #[error("Video assembly failed: {0}")]
    Assembly(#[source] MediaError),

    #[error("Task store write failed: {0}")]
    Persistence(#[source] StoreError),

    #[error("Illegal task transition: {0}")]
    InvalidTransition(#[source] ModelError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn seeding(msg: impl Into<String>) -> Self {
        Self::Seeding(msg.into())
    }

    pub fn propagation(msg: impl Into<String>) -> Self {
        Self::Propagation(msg.into())
    }

    pub fn annotation(msg: impl Into<String>) -> Self {
        Self::Annotation(msg.into())
    }

    /// Name of the stage that failed, used as a metrics label.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "submission",
            PipelineError::Extraction(_) => "extraction",
            PipelineError::TrackerInit(_) => "tracker_init",
            PipelineError::NoFrames | PipelineError::Detection(_) | PipelineError::DetectionEmpty { .. } => "detection",
            PipelineError::Seeding(_) => "seeding",
            PipelineError::Propagation(_) => "propagation",
            PipelineError::Annotation(_) => "annotation",
            PipelineError::Assembly(_) => "assembly",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::InvalidTransition(_) => "state_machine",
            PipelineError::Workspace(_) => "workspace",
            PipelineError::Internal(_) => "internal",
        }
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, PipelineError::Persistence(_))
    }

    pub fn is_detection_empty(&self) -> bool {
        matches!(self, PipelineError::DetectionEmpty { .. })
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {}", e))
    }
}
