//! Fixed progress checkpoints marking pipeline stage boundaries.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A stage boundary with a fixed progress value.
///
/// Each checkpoint is written once the preceding stage has finished, and its
/// message announces the stage that runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Queued,
    Started,
    FramesExtracted,
    TrackerInitialized,
    ObjectsDetected,
    TrackerSeeded,
    PropagationComplete,
    AnnotationComplete,
    Completed,
}

impl Checkpoint {
    /// Checkpoints written while the task is Processing, in order.
    pub const PIPELINE: [Checkpoint; 7] = [
        Checkpoint::Started,
        Checkpoint::FramesExtracted,
        Checkpoint::TrackerInitialized,
        Checkpoint::ObjectsDetected,
        Checkpoint::TrackerSeeded,
        Checkpoint::PropagationComplete,
        Checkpoint::AnnotationComplete,
    ];

    pub fn progress(&self) -> f32 {
        match self {
            Checkpoint::Queued | Checkpoint::Started => 0.0,
            Checkpoint::FramesExtracted => 10.0,
            Checkpoint::TrackerInitialized => 20.0,
            Checkpoint::ObjectsDetected => 30.0,
            Checkpoint::TrackerSeeded => 40.0,
            Checkpoint::PropagationComplete => 50.0,
            Checkpoint::AnnotationComplete => 70.0,
            Checkpoint::Completed => 100.0,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Checkpoint::Queued => "Task queued for processing",
            Checkpoint::Started => "Extracting video frames...",
            Checkpoint::FramesExtracted => "Initializing video tracker...",
            Checkpoint::TrackerInitialized => "Detecting objects in first frame...",
            Checkpoint::ObjectsDetected => "Setting up object tracking...",
            Checkpoint::TrackerSeeded => "Tracking objects across video...",
            Checkpoint::PropagationComplete => "Creating annotated video...",
            Checkpoint::AnnotationComplete => "Finalizing output video...",
            Checkpoint::Completed => "Video processing completed successfully!",
        }
    }
}
