//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use vtrack_inference::{InferenceConfig, InferenceContext};
use vtrack_media::{AssemblerConfig, ExtractorConfig, FfmpegFrameExtractor, FfmpegVideoAssembler};
use vtrack_store::{build_store, StoreConfig, TaskStore, WatchConfig};
use vtrack_worker::{Orchestrator, PipelineConfig, WorkspaceLayout};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub watch: WatchConfig,
}

impl AppState {
    pub fn new(config: ApiConfig, orchestrator: Arc<Orchestrator>, watch: WatchConfig) -> Self {
        Self {
            config,
            orchestrator,
            watch,
        }
    }

    /// Wire the full pipeline from environment configuration.
    ///
    /// Fails if the task store or the inference service cannot be reached.
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let store_config = StoreConfig::from_env();
        info!(backend = ?store_config.backend, "Connecting task store");
        let store = build_store(store_config).context("failed to build task store")?;
        store.ping().await.context("task store is unreachable")?;

        let inference_config = InferenceConfig::from_env();
        info!(url = %inference_config.base_url, "Connecting inference service");
        let inference = InferenceContext::connect(inference_config)
            .await
            .context("inference service did not become healthy")?;

        let pipeline = PipelineConfig::from_env();
        pipeline
            .layout
            .ensure_dirs()
            .await
            .context("failed to create workspace directories")?;
        info!(
            uploads = %pipeline.layout.upload_dir.display(),
            outputs = %pipeline.layout.output_dir.display(),
            prompt_type = %pipeline.default_prompt_type,
            fps = pipeline.output_fps,
            dedup = pipeline.dedup_enabled,
            "Pipeline configured"
        );

        let orchestrator = Orchestrator::new(
            store,
            inference,
            Arc::new(FfmpegFrameExtractor::new(ExtractorConfig::from_env())),
            Arc::new(FfmpegVideoAssembler::new(AssemblerConfig::from_env())),
            pipeline,
        );

        Ok(Self::new(config, Arc::new(orchestrator), WatchConfig::from_env()))
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        self.orchestrator.store()
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        self.orchestrator.layout()
    }
}
