//! Shared data models for the vtrack backend.
//!
//! This crate provides Serde-serializable types for:
//! - Tasks, their status state machine and progress checkpoints
//! - Detections, boxes and binary masks
//! - Frame sequences and segment maps
//! - API request/response payloads

pub mod checkpoint;
pub mod detection;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod mask;
pub mod request;
pub mod task;

// Re-export common types
pub use checkpoint::Checkpoint;
pub use detection::{labels_by_id, DetectionResult};
pub use error::{ModelError, ModelResult};
pub use frame::{annotated_frame_file_name, frame_file_name, parse_frame_index, Frame, FrameSequence};
pub use geometry::{BoundingBox, Point};
pub use mask::{FrameSegments, Mask, ObjectId, SegmentMap, MASK_THRESHOLD};
pub use request::{PromptType, Thresholds, TrackingRequest, TrackingResponse, UploadResponse};
pub use task::{Task, TaskId, TaskStatus};
