//! Redis-backed task cache
//!
//! Each queue is one Redis hash: `{prefix}:queue:{queue_name}`, field = task id,
//! value = JSON-encoded `DistributedTaskRecord`.

use std::collections::HashMap;

use async_trait::async_trait;
use coordinator_core::{CoordinatorError, CoordinatorResult, DistributedTaskRecord, TaskCacheStore};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, instrument, warn};

use super::cache_error;

const UPDATE_EXISTING_SCRIPT: &str = r#"
if redis.call("HEXISTS", KEYS[1], ARGV[1]) == 1 then
    redis.call("HSET", KEYS[1], ARGV[1], ARGV[2])
    return 1
else
    return 0
end
"#;

/// Task cache shared by every instance connected to the same Redis
#[derive(Clone)]
pub struct RedisTaskCacheStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisTaskCacheStore {
    pub fn new(conn: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    /// Build full hash key with prefix
    fn queue_key(&self, queue_name: &str) -> String {
        if self.key_prefix.is_empty() {
            format!("queue:{queue_name}")
        } else {
            format!("{}:queue:{}", self.key_prefix, queue_name)
        }
    }

    fn decode(raw: &str) -> CoordinatorResult<DistributedTaskRecord> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[async_trait]
impl TaskCacheStore for RedisTaskCacheStore {
    #[instrument(skip(self))]
    async fn get_all(&self, queue_name: &str) -> CoordinatorResult<Vec<DistributedTaskRecord>> {
        let mut conn = self.conn.clone();
        let entries: HashMap<String, String> = conn
            .hgetall(self.queue_key(queue_name))
            .await
            .map_err(cache_error)?;

        let mut records = Vec::with_capacity(entries.len());
        for (id, raw) in entries {
            match Self::decode(&raw) {
                Ok(record) => records.push(record),
                // A corrupt entry must not hide the rest of the queue
                Err(e) => warn!("Skipping undecodable task {} in queue {}: {}", id, queue_name, e),
            }
        }
        Ok(records)
    }

    async fn get(
        &self,
        queue_name: &str,
        id: &str,
    ) -> CoordinatorResult<Option<DistributedTaskRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(self.queue_key(queue_name), id)
            .await
            .map_err(cache_error)?;

        raw.as_deref().map(Self::decode).transpose()
    }

    async fn put(&self, queue_name: &str, record: &DistributedTaskRecord) -> CoordinatorResult<()> {
        let raw = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(self.queue_key(queue_name), &record.id, raw)
            .await
            .map_err(cache_error)?;
        Ok(())
    }

    async fn update_existing(
        &self,
        queue_name: &str,
        record: &DistributedTaskRecord,
    ) -> CoordinatorResult<bool> {
        let raw = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let written: i64 = redis::Script::new(UPDATE_EXISTING_SCRIPT)
            .key(self.queue_key(queue_name))
            .arg(&record.id)
            .arg(raw)
            .invoke_async(&mut conn)
            .await
            .map_err(cache_error)?;
        Ok(written == 1)
    }

    async fn remove(&self, queue_name: &str, id: &str) -> CoordinatorResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .hdel(self.queue_key(queue_name), id)
            .await
            .map_err(cache_error)?;
        Ok(removed > 0)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn replace_kind(
        &self,
        queue_name: &str,
        kind: &str,
        records: &[DistributedTaskRecord],
    ) -> CoordinatorResult<()> {
        let key = self.queue_key(queue_name);
        let existing = self.get_all(queue_name).await?;

        let stale_ids: Vec<&str> = existing
            .iter()
            .filter(|r| r.is_kind(kind) && !records.iter().any(|n| n.id == r.id))
            .map(|r| r.id.as_str())
            .collect();

        if stale_ids.is_empty() && records.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        if !stale_ids.is_empty() {
            pipe.hdel(&key, stale_ids.clone()).ignore();
        }
        for record in records {
            let raw = serde_json::to_string(record).map_err(CoordinatorError::Serialization)?;
            pipe.hset(&key, &record.id, raw).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(cache_error)?;

        debug!(
            "Replaced {} records of kind {} in queue {} ({} stale removed)",
            records.len(),
            kind,
            queue_name,
            stale_ids.len()
        );
        Ok(())
    }
}
