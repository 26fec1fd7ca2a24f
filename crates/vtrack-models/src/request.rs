//! API request and response payloads.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};
use crate::task::{TaskId, TaskStatus};

pub const DEFAULT_BOX_THRESHOLD: f32 = 0.35;
pub const DEFAULT_TEXT_THRESHOLD: f32 = 0.25;

/// Seed geometry used for every object in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    Point,
    #[default]
    Box,
    Mask,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::Point => "point",
            PromptType::Box => "box",
            PromptType::Mask => "mask",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PromptType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "point" | "points" => Ok(PromptType::Point),
            "box" => Ok(PromptType::Box),
            "mask" => Ok(PromptType::Mask),
            other => Err(ModelError::validation(format!("unknown prompt type: {}", other))),
        }
    }
}

/// Detector confidence thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Thresholds {
    pub box_threshold: f32,
    pub text_threshold: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            box_threshold: DEFAULT_BOX_THRESHOLD,
            text_threshold: DEFAULT_TEXT_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> ModelResult<()> {
        for (name, v) in [("box_threshold", self.box_threshold), ("text_threshold", self.text_threshold)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ModelError::validation(format!("{} must be within [0, 1], got {}", name, v)));
            }
        }
        Ok(())
    }
}

fn default_box_threshold() -> f32 {
    DEFAULT_BOX_THRESHOLD
}

fn default_text_threshold() -> f32 {
    DEFAULT_TEXT_THRESHOLD
}

/// Request to track objects in a previously uploaded video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TrackingRequest {
    /// Id returned by the upload endpoint
    pub file_id: String,

    /// Free-text description of the objects to track
    pub text_prompt: String,

    /// Seed geometry; the deployment default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_type: Option<PromptType>,

    #[serde(default = "default_box_threshold")]
    pub box_threshold: f32,

    #[serde(default = "default_text_threshold")]
    pub text_threshold: f32,

    /// Use the source frame rate for the output instead of the configured default
    #[serde(default)]
    pub match_source_fps: bool,
}

impl TrackingRequest {
    pub fn new(file_id: impl Into<String>, text_prompt: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            text_prompt: text_prompt.into(),
            prompt_type: None,
            box_threshold: DEFAULT_BOX_THRESHOLD,
            text_threshold: DEFAULT_TEXT_THRESHOLD,
            match_source_fps: false,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            box_threshold: self.box_threshold,
            text_threshold: self.text_threshold,
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.file_id.trim().is_empty() {
            return Err(ModelError::validation("file_id must not be empty"));
        }
        if self.text_prompt.trim().is_empty() {
            return Err(ModelError::validation("text_prompt must not be empty"));
        }
        self.thresholds().validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TrackingResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub file_id: String,
    pub filename: String,
}
