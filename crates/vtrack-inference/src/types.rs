//! Inference service request/response types.

use serde::{Deserialize, Serialize};

use vtrack_models::ObjectId;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Text-prompted box detection on one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundRequest {
    pub image_path: String,
    pub prompt: String,
    pub box_threshold: f32,
    pub text_threshold: f32,
}

/// Detected boxes, normalized `(cx, cy, w, h)`, parallel to `confidences` and `labels`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundResponse {
    #[serde(default)]
    pub boxes: Vec<[f32; 4]>,
    #[serde(default)]
    pub confidences: Vec<f32>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Box-prompted segmentation on one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRequest {
    pub image_path: String,
    /// Absolute `(x1, y1, x2, y2)`
    pub boxes: Vec<[f32; 4]>,
}

/// One base64 PNG mask per requested box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentResponse {
    pub masks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub frame_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

/// A seed prompt for one object. Exactly one geometry is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub frame_index: u32,
    pub object_id: ObjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<[u32; 2]>>,
    /// 1 = positive click
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<u8>>,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
}

/// One NDJSON line of a propagation stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagatedFrame {
    pub frame_index: u32,
    #[serde(default)]
    pub objects: Vec<PropagatedObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagatedObject {
    pub object_id: ObjectId,
    pub mask: String,
}
