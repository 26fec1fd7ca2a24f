use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geometry::BoundingBox;
use crate::mask::ObjectId;

/// One object found on the seed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionResult {
    /// Tracking identity, assigned in detection order from 1
    pub object_id: ObjectId,
    pub label: String,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Label lookup used when rendering tracked objects.
pub fn labels_by_id(detections: &[DetectionResult]) -> BTreeMap<ObjectId, String> {
    detections.iter().map(|d| (d.object_id, d.label.clone())).collect()
}
