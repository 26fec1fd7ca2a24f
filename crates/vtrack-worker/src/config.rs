//! Pipeline configuration.

use std::time::Duration;

use vtrack_inference::DEFAULT_POINTS_PER_OBJECT;
use vtrack_media::DEFAULT_OUTPUT_FPS;
use vtrack_models::PromptType;

use crate::layout::WorkspaceLayout;
use crate::retry::RetryConfig;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub layout: WorkspaceLayout,
    /// Seed geometry when a request does not name one
    pub default_prompt_type: PromptType,
    /// Clicks sampled per object in point mode
    pub points_per_object: usize,
    /// Output frame rate unless a run asks to match the source
    pub output_fps: f64,
    /// Collapse identical concurrent submissions onto one task
    pub dedup_enabled: bool,
    /// How long a submission fingerprint is held
    pub dedup_ttl: Duration,
    /// Fixed RNG seed for point sampling; random when unset
    pub sampling_seed: Option<u64>,
    pub store_retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: WorkspaceLayout::default(),
            default_prompt_type: PromptType::Box,
            points_per_object: DEFAULT_POINTS_PER_OBJECT,
            output_fps: DEFAULT_OUTPUT_FPS,
            dedup_enabled: false,
            dedup_ttl: Duration::from_secs(3600),
            sampling_seed: None,
            store_retry: RetryConfig::new("task_store_put"),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            layout: WorkspaceLayout::from_env(),
            default_prompt_type: std::env::var("PROMPT_TYPE_FOR_VIDEO")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_prompt_type),
            points_per_object: std::env::var("POINTS_PER_OBJECT")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.points_per_object),
            output_fps: std::env::var("OUTPUT_FPS")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|f| *f > 0.0)
                .unwrap_or(defaults.output_fps),
            dedup_enabled: std::env::var("DEDUP_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            dedup_ttl: std::env::var("TASK_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.dedup_ttl),
            sampling_seed: std::env::var("SAMPLING_SEED").ok().and_then(|s| s.parse().ok()),
            store_retry: RetryConfig::from_env("task_store_put"),
        }
    }

    pub fn with_layout(mut self, layout: WorkspaceLayout) -> Self {
        self.layout = layout;
        self
    }

    /// The request's prompt type wins over the configured default.
    pub fn prompt_type_for(&self, requested: Option<PromptType>) -> PromptType {
        requested.unwrap_or(self.default_prompt_type)
    }
}
