//! Adapters for the external inference service.
//!
//! Detection and segmentation are opaque capabilities behind two narrow
//! traits, [`Detector`] and [`VideoTracker`]. The HTTP implementations talk
//! JSON to a model server; tests substitute in-process fakes.

pub mod client;
pub mod codec;
pub mod context;
pub mod detector;
pub mod error;
pub mod sampler;
pub mod tracker;
pub mod types;

pub use client::{InferenceClient, InferenceConfig};
pub use codec::{decode_mask, encode_mask};
pub use context::InferenceContext;
pub use detector::{DetectionOutput, Detector, HttpDetector};
pub use error::{InferenceError, InferenceResult};
pub use sampler::{sample_points, PromptSampler, SeedPrompt, DEFAULT_POINTS_PER_OBJECT};
pub use tracker::{HttpTracker, PropagationStream, TrackerSession, VideoTracker};
