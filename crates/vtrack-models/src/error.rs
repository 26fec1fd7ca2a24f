//! Model validation errors.

use thiserror::Error;

use crate::task::TaskStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Progress cannot go backwards: {current} -> {next}")]
    ProgressRegression { current: f32, next: f32 },

    #[error("Frame sequence is not contiguous: expected index {expected}, found {found}")]
    NonContiguousFrames { expected: u32, found: u32 },

    #[error("Invalid mask buffer: expected {expected} bytes, got {actual}")]
    MaskSize { expected: usize, actual: usize },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
