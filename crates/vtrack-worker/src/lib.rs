//! Tracking pipeline orchestration.
//!
//! This crate provides:
//! - The [`Orchestrator`] that drives a task through its stages
//! - Pipeline configuration and the on-disk workspace layout
//! - Backoff for task store writes
//! - Structured per-task logging and pipeline metrics

pub mod config;
pub mod error;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod retry;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use layout::{is_safe_id, WorkspaceLayout};
pub use logging::TaskLogger;
pub use orchestrator::{Orchestrator, RunSpec, Submission};
pub use retry::{retry_async, RetryConfig, RetryResult};
