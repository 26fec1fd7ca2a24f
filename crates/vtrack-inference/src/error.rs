//! Inference adapter error types.

use thiserror::Error;

pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Mask decode failed: {0}")]
    MaskDecode(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl InferenceError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn mask_decode(msg: impl Into<String>) -> Self {
        Self::MaskDecode(msg.into())
    }

    /// Only consulted while connecting; stage calls are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InferenceError::ServiceUnavailable(_) | InferenceError::Network(_))
    }
}

impl From<tokio::task::JoinError> for InferenceError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {}", e))
    }
}
