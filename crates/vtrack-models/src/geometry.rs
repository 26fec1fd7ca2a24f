use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in absolute pixel corner form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Convert a normalized `(cx, cy, w, h)` box to absolute corners,
    /// clamped to the frame.
    pub fn from_normalized_cxcywh(cx: f32, cy: f32, w: f32, h: f32, frame_width: u32, frame_height: u32) -> Self {
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        let x1 = ((cx - w / 2.0) * fw).clamp(0.0, fw);
        let y1 = ((cy - h / 2.0) * fh).clamp(0.0, fh);
        let x2 = ((cx + w / 2.0) * fw).clamp(0.0, fw);
        let y2 = ((cy + h / 2.0) * fh).clamp(0.0, fh);
        Self { x1, y1, x2, y2 }
    }

    /// Strictly positive width and height.
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// A pixel coordinate `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}
