use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use coordinator_core::{CoordinatorResult, DistributedTaskRecord, TaskCacheStore};
use tokio::sync::RwLock;
use tracing::debug;

type QueueEntries = BTreeMap<String, DistributedTaskRecord>;

/// 内存任务缓存
///
/// 队列名 -> (任务id -> 记录)。同一进程内的多个队列实例共享时需要克隆同一个实例。
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskCacheStore {
    queues: Arc<RwLock<HashMap<String, QueueEntries>>>,
}

impl InMemoryTaskCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn queue_len(&self, queue_name: &str) -> usize {
        self.queues
            .read()
            .await
            .get(queue_name)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TaskCacheStore for InMemoryTaskCacheStore {
    async fn get_all(&self, queue_name: &str) -> CoordinatorResult<Vec<DistributedTaskRecord>> {
        let queues = self.queues.read().await;
        Ok(queues
            .get(queue_name)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(
        &self,
        queue_name: &str,
        id: &str,
    ) -> CoordinatorResult<Option<DistributedTaskRecord>> {
        let queues = self.queues.read().await;
        Ok(queues.get(queue_name).and_then(|entries| entries.get(id)).cloned())
    }

    async fn put(&self, queue_name: &str, record: &DistributedTaskRecord) -> CoordinatorResult<()> {
        let mut queues = self.queues.write().await;
        queues
            .entry(queue_name.to_string())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_existing(
        &self,
        queue_name: &str,
        record: &DistributedTaskRecord,
    ) -> CoordinatorResult<bool> {
        let mut queues = self.queues.write().await;
        match queues
            .get_mut(queue_name)
            .and_then(|entries| entries.get_mut(&record.id))
        {
            Some(current) => {
                *current = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, queue_name: &str, id: &str) -> CoordinatorResult<bool> {
        let mut queues = self.queues.write().await;
        let removed = queues
            .get_mut(queue_name)
            .map(|entries| entries.remove(id).is_some())
            .unwrap_or(false);
        Ok(removed)
    }

    async fn replace_kind(
        &self,
        queue_name: &str,
        kind: &str,
        records: &[DistributedTaskRecord],
    ) -> CoordinatorResult<()> {
        let mut queues = self.queues.write().await;
        let entries = queues.entry(queue_name.to_string()).or_default();
        entries.retain(|_, record| !record.is_kind(kind));
        for record in records {
            entries.insert(record.id.clone(), record.clone());
        }
        debug!(
            "队列 {} 中 {} 类型的记录被整体替换为 {} 条",
            queue_name,
            kind,
            records.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coordinator_core::DistributedTaskStatus;

    fn record(id: &str, kind: &str) -> DistributedTaskRecord {
        DistributedTaskRecord {
            id: id.to_string(),
            kind: kind.to_string(),
            percentage: 0.0,
            is_completed: false,
            exception: None,
            status: DistributedTaskStatus::Created,
            updated_at: Utc::now(),
            body: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_queues_are_partitioned_by_name() {
        let store = InMemoryTaskCacheStore::new();
        store.put("encryption", &record("a", "job")).await.unwrap();
        store.put("conversion", &record("a", "job")).await.unwrap();

        assert_eq!(store.get_all("encryption").await.unwrap().len(), 1);
        assert!(store.remove("encryption", "a").await.unwrap());
        assert_eq!(store.queue_len("encryption").await, 0);
        assert_eq!(store.queue_len("conversion").await, 1);
    }

    #[tokio::test]
    async fn test_put_replaces_same_id() {
        let store = InMemoryTaskCacheStore::new();
        store.put("q", &record("a", "job")).await.unwrap();

        let mut updated = record("a", "job");
        updated.percentage = 40.0;
        store.put("q", &updated).await.unwrap();

        let all = store.get_all("q").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].percentage, 40.0);
    }

    #[tokio::test]
    async fn test_replace_kind_keeps_other_kinds() {
        let store = InMemoryTaskCacheStore::new();
        store.put("q", &record("a", "thumbnail")).await.unwrap();
        store.put("q", &record("b", "thumbnail")).await.unwrap();
        store.put("q", &record("c", "other")).await.unwrap();

        store
            .replace_kind("q", "thumbnail", &[record("d", "thumbnail")])
            .await
            .unwrap();

        let mut ids: Vec<String> = store
            .get_all("q")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["c".to_string(), "d".to_string()]);
    }

    #[tokio::test]
    async fn test_update_existing_skips_removed_records() {
        let store = InMemoryTaskCacheStore::new();
        store.put("q", &record("a", "job")).await.unwrap();

        let mut updated = record("a", "job");
        updated.percentage = 60.0;
        assert!(store.update_existing("q", &updated).await.unwrap());
        assert_eq!(store.get("q", "a").await.unwrap().unwrap().percentage, 60.0);

        store.remove("q", "a").await.unwrap();
        assert!(!store.update_existing("q", &updated).await.unwrap());
        assert!(!store.update_existing("other", &updated).await.unwrap());
        assert_eq!(store.queue_len("q").await, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_returns_false() {
        let store = InMemoryTaskCacheStore::new();
        assert!(!store.remove("q", "missing").await.unwrap());
        assert!(store.get("q", "missing").await.unwrap().is_none());
    }
}
