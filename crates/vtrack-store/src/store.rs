//! The task store abstraction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use vtrack_models::{PromptType, Task, TaskId, Thresholds};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreResult;
use crate::memory::MemoryTaskStore;
use crate::redis_store::RedisTaskStore;

/// Time-expiring key-value persistence for task records.
///
/// Writes are last-write-wins full replacements. The store does no conflict
/// resolution: each task id must have a single writer.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist the full record under its id, replacing any prior value and
    /// resetting the expiry countdown.
    async fn put(&self, task: &Task) -> StoreResult<()>;

    /// Fetch a record. `None` means unknown or expired.
    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>>;

    /// Register `id` as the owner of `fingerprint` unless another task already
    /// owns it, in which case that task's id is returned.
    async fn claim_fingerprint(&self, fingerprint: &str, id: &TaskId, ttl: Duration) -> StoreResult<Option<TaskId>>;

    /// Hand `fingerprint` from `stale` to `id`.
    ///
    /// Succeeds (returning `None`) when `stale` still owns it or nobody does.
    /// If a third task took it in the meantime, that task's id is returned
    /// and nothing changes.
    async fn replace_fingerprint(
        &self,
        fingerprint: &str,
        stale: &TaskId,
        id: &TaskId,
        ttl: Duration,
    ) -> StoreResult<Option<TaskId>>;

    /// Drop `fingerprint` if `id` still owns it.
    async fn release_fingerprint(&self, fingerprint: &str, id: &TaskId) -> StoreResult<()>;

    /// Connectivity probe.
    async fn ping(&self) -> StoreResult<()>;
}

/// Build the configured store.
pub fn build_store(config: StoreConfig) -> StoreResult<Arc<dyn TaskStore>> {
    match config.backend {
        StoreBackend::Redis => Ok(Arc::new(RedisTaskStore::new(config)?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryTaskStore::new(config.task_ttl))),
    }
}

/// Stable fingerprint of a submission, used for optional deduplication.
pub fn submission_fingerprint(file_id: &str, prompt: &str, prompt_type: PromptType, thresholds: Thresholds) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.trim().to_lowercase().as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt_type.as_str().as_bytes());
    hasher.update(thresholds.box_threshold.to_le_bytes());
    hasher.update(thresholds.text_threshold.to_le_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
