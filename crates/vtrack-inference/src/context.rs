//! Explicitly constructed inference capabilities shared by every run.

use std::sync::Arc;

use tracing::info;

use crate::client::{InferenceClient, InferenceConfig};
use crate::detector::{Detector, HttpDetector};
use crate::error::InferenceResult;
use crate::tracker::{HttpTracker, VideoTracker};

/// Detector and tracker handles, built once before any task runs.
#[derive(Clone)]
pub struct InferenceContext {
    detector: Arc<dyn Detector>,
    tracker: Arc<dyn VideoTracker>,
    client: Option<Arc<InferenceClient>>,
}

impl InferenceContext {
    /// Wrap arbitrary detector and tracker implementations.
    pub fn new(detector: Arc<dyn Detector>, tracker: Arc<dyn VideoTracker>) -> Self {
        Self {
            detector,
            tracker,
            client: None,
        }
    }

    /// Connect to the inference service, failing if it never reports healthy.
    pub async fn connect(config: InferenceConfig) -> InferenceResult<Self> {
        let client = Arc::new(InferenceClient::new(config)?);
        client.wait_until_healthy().await?;
        info!(url = %client.base_url(), "Inference context ready");

        Ok(Self {
            detector: Arc::new(HttpDetector::new(Arc::clone(&client))),
            tracker: Arc::new(HttpTracker::new(Arc::clone(&client))),
            client: Some(client),
        })
    }

    pub fn detector(&self) -> Arc<dyn Detector> {
        Arc::clone(&self.detector)
    }

    pub fn tracker(&self) -> Arc<dyn VideoTracker> {
        Arc::clone(&self.tracker)
    }

    /// Live health of the backing service; in-process contexts are always healthy.
    pub async fn is_healthy(&self) -> bool {
        match &self.client {
            Some(client) => client.health_check().await.unwrap_or(false),
            None => true,
        }
    }
}

impl std::fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceContext")
            .field("remote", &self.client.as_ref().map(|c| c.base_url().to_string()))
            .finish()
    }
}
