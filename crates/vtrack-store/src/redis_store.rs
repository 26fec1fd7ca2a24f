//! Redis-backed task store.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use tracing::{debug, info};

use vtrack_models::{Task, TaskId};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::TaskStore;

/// Task records as JSON strings under `{prefix}:task:{id}` with `SET .. EX`.
pub struct RedisTaskStore {
    client: redis::Client,
    config: StoreConfig,
}

impl RedisTaskStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| StoreError::connection_failed(e.to_string()))?;
        info!(prefix = %config.key_prefix, ttl_secs = config.task_ttl.as_secs(), "Redis task store configured");
        Ok(Self { client, config })
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn put(&self, task: &Task) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let key = self.config.task_key(task.id.as_str());
        let payload = serde_json::to_string(task)?;

        conn.set_ex::<_, _, ()>(&key, payload, self.config.task_ttl.as_secs()).await?;
        debug!(task_id = %task.id, status = %task.status, "Task record written");
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        let mut conn = self.connection().await?;
        let key = self.config.task_key(id.as_str());

        let payload: Option<String> = conn.get(&key).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn claim_fingerprint(&self, fingerprint: &str, id: &TaskId, ttl: Duration) -> StoreResult<Option<TaskId>> {
        let mut conn = self.connection().await?;
        let key = self.config.dedup_key(fingerprint);

        let claimed: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(id.as_str())
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        if claimed.is_some() {
            return Ok(None);
        }

        // The owner can expire between SET NX and GET; treat that as unclaimed.
        let owner: Option<String> = conn.get(&key).await?;
        Ok(owner.map(TaskId))
    }

    async fn replace_fingerprint(
        &self,
        fingerprint: &str,
        stale: &TaskId,
        id: &TaskId,
        ttl: Duration,
    ) -> StoreResult<Option<TaskId>> {
        let mut conn = self.connection().await?;
        let key = self.config.dedup_key(fingerprint);

        let script = Script::new(
            r#"
            local current = redis.call('GET', KEYS[1])
            if current == false or current == ARGV[1] then
                redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
                return false
            end
            return current
            "#,
        );
        let owner: Option<String> = script
            .key(&key)
            .arg(stale.as_str())
            .arg(id.as_str())
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await?;
        Ok(owner.map(TaskId))
    }

    async fn release_fingerprint(&self, fingerprint: &str, id: &TaskId) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let key = self.config.dedup_key(fingerprint);

        let script = Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
            "#,
        );
        let deleted: i32 = script.key(&key).arg(id.as_str()).invoke_async(&mut conn).await?;
        debug!(fingerprint, deleted, "Released submission fingerprint");
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::unavailable(format!("unexpected PING reply: {}", pong)))
        }
    }
}
