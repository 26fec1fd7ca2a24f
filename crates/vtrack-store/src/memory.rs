//! In-process task store with the same expiry semantics as Redis.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use vtrack_models::{Task, TaskId};

use crate::error::StoreResult;
use crate::store::TaskStore;

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Entry<T> {
    fn live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Memory-backed [`TaskStore`] for tests and single-process deployments.
pub struct MemoryTaskStore {
    ttl: Duration,
    tasks: RwLock<HashMap<TaskId, Entry<Task>>>,
    fingerprints: RwLock<HashMap<String, Entry<TaskId>>>,
}

impl MemoryTaskStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tasks: RwLock::new(HashMap::new()),
            fingerprints: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.tasks.read().await.values().filter(|e| e.live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn put(&self, task: &Task) -> StoreResult<()> {
        let now = Instant::now();
        let mut tasks = self.tasks.write().await;
        tasks.retain(|_, e| e.live(now));
        tasks.insert(
            task.id.clone(),
            Entry {
                value: task.clone(),
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        let now = Instant::now();
        let tasks = self.tasks.read().await;
        Ok(tasks.get(id).filter(|e| e.live(now)).map(|e| e.value.clone()))
    }

    async fn claim_fingerprint(&self, fingerprint: &str, id: &TaskId, ttl: Duration) -> StoreResult<Option<TaskId>> {
        let now = Instant::now();
        let mut fingerprints = self.fingerprints.write().await;
        if let Some(existing) = fingerprints.get(fingerprint).filter(|e| e.live(now)) {
            return Ok(Some(existing.value.clone()));
        }
        fingerprints.insert(
            fingerprint.to_string(),
            Entry {
                value: id.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(None)
    }

    async fn replace_fingerprint(
        &self,
        fingerprint: &str,
        stale: &TaskId,
        id: &TaskId,
        ttl: Duration,
    ) -> StoreResult<Option<TaskId>> {
        let now = Instant::now();
        let mut fingerprints = self.fingerprints.write().await;
        if let Some(current) = fingerprints.get(fingerprint).filter(|e| e.live(now)) {
            if &current.value != stale {
                return Ok(Some(current.value.clone()));
            }
        }
        fingerprints.insert(
            fingerprint.to_string(),
            Entry {
                value: id.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(None)
    }

    async fn release_fingerprint(&self, fingerprint: &str, id: &TaskId) -> StoreResult<()> {
        let mut fingerprints = self.fingerprints.write().await;
        if fingerprints.get(fingerprint).is_some_and(|e| &e.value == id) {
            fingerprints.remove(fingerprint);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
