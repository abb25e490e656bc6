use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coordinator_core::{
    CoordinatorResult, DeleteOutcome, InstanceRegistration, RegistrationBackend, WriteOutcome,
};
use tokio::sync::RwLock;
use tracing::debug;

/// 内存实例注册表
///
/// 以版本号模拟数据库的乐观并发控制，适用于单进程部署与测试。
/// 行按 `(角色, 实例ID)` 存放。
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistrationBackend {
    rows: Arc<RwLock<HashMap<RowKey, InstanceRegistration>>>,
}

type RowKey = (String, String);

fn row_key(registration: &InstanceRegistration) -> RowKey {
    (
        registration.worker_type_name.clone(),
        registration.instance_registration_id.clone(),
    )
}

fn lookup_key(worker_type_name: &str, instance_id: &str) -> RowKey {
    (worker_type_name.to_string(), instance_id.to_string())
}

impl InMemoryRegistrationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl RegistrationBackend for InMemoryRegistrationBackend {
    async fn insert(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome> {
        let mut rows = self.rows.write().await;
        let key = row_key(registration);
        if rows.contains_key(&key) {
            return Ok(WriteOutcome::Conflict);
        }

        let mut row = registration.clone();
        row.version = 1;
        rows.insert(key, row);
        Ok(WriteOutcome::Written(1))
    }

    async fn update(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&row_key(registration)) {
            Some(row) if row.version == registration.version => {
                let version = row.version + 1;
                *row = InstanceRegistration {
                    version,
                    ..registration.clone()
                };
                Ok(WriteOutcome::Written(version))
            }
            Some(row) => {
                debug!(
                    "注册行版本冲突: {} (期望 {}, 实际 {})",
                    registration.instance_registration_id, registration.version, row.version
                );
                Ok(WriteOutcome::Conflict)
            }
            None => Ok(WriteOutcome::Conflict),
        }
    }

    async fn upsert(&self, registration: &InstanceRegistration) -> CoordinatorResult<i64> {
        let mut rows = self.rows.write().await;
        let key = row_key(registration);
        let version = rows.get(&key).map(|row| row.version + 1).unwrap_or(1);
        rows.insert(
            key,
            InstanceRegistration {
                version,
                ..registration.clone()
            },
        );
        Ok(version)
    }

    async fn find(
        &self,
        worker_type_name: &str,
        instance_id: &str,
    ) -> CoordinatorResult<Option<InstanceRegistration>> {
        Ok(self
            .rows
            .read()
            .await
            .get(&lookup_key(worker_type_name, instance_id))
            .cloned())
    }

    async fn list_by_worker_type(
        &self,
        worker_type_name: &str,
    ) -> CoordinatorResult<Vec<InstanceRegistration>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| row.worker_type_name == worker_type_name)
            .cloned()
            .collect())
    }

    async fn delete(&self, worker_type_name: &str, instance_id: &str) -> CoordinatorResult<DeleteOutcome> {
        match self
            .rows
            .write()
            .await
            .remove(&lookup_key(worker_type_name, instance_id))
        {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::AlreadyGone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn registration(id: &str, worker_type: &str) -> InstanceRegistration {
        InstanceRegistration::new(id, worker_type, Utc::now())
    }

    #[tokio::test]
    async fn test_insert_then_duplicate_conflicts() {
        let backend = InMemoryRegistrationBackend::new();
        let reg = registration("host-1", "conversion");

        assert_eq!(backend.insert(&reg).await.unwrap(), WriteOutcome::Written(1));
        assert_eq!(backend.insert(&reg).await.unwrap(), WriteOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let backend = InMemoryRegistrationBackend::new();
        let mut reg = registration("host-1", "conversion");
        backend.insert(&reg).await.unwrap();

        reg.version = 1;
        reg.is_active = true;
        assert_eq!(backend.update(&reg).await.unwrap(), WriteOutcome::Written(2));

        // 旧版本号写入被拒绝
        reg.version = 1;
        assert_eq!(backend.update(&reg).await.unwrap(), WriteOutcome::Conflict);

        let stored = backend.find("conversion", "host-1").await.unwrap().unwrap();
        assert!(stored.is_active);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_update_missing_row_conflicts() {
        let backend = InMemoryRegistrationBackend::new();
        let mut reg = registration("host-1", "conversion");
        reg.version = 3;
        assert_eq!(backend.update(&reg).await.unwrap(), WriteOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_list_filters_by_worker_type() {
        let backend = InMemoryRegistrationBackend::new();
        backend.upsert(&registration("host-1", "conversion")).await.unwrap();
        backend.upsert(&registration("host-2", "conversion")).await.unwrap();
        backend.upsert(&registration("host-3", "encryption")).await.unwrap();

        assert_eq!(backend.list_by_worker_type("conversion").await.unwrap().len(), 2);
        assert_eq!(backend.list_by_worker_type("encryption").await.unwrap().len(), 1);
        assert_eq!(backend.count().await, 3);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = InMemoryRegistrationBackend::new();
        backend.upsert(&registration("host-1", "conversion")).await.unwrap();

        assert_eq!(backend.delete("conversion", "host-1").await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(
            backend.delete("conversion", "host-1").await.unwrap(),
            DeleteOutcome::AlreadyGone
        );
    }

    #[tokio::test]
    async fn test_same_instance_has_one_row_per_role() {
        let backend = InMemoryRegistrationBackend::new();
        let mut conversion = registration("host-1", "conversion");
        conversion.is_active = true;
        let encryption = registration("host-1", "encryption");

        assert_eq!(backend.insert(&conversion).await.unwrap(), WriteOutcome::Written(1));
        assert_eq!(backend.insert(&encryption).await.unwrap(), WriteOutcome::Written(1));
        assert_eq!(backend.count().await, 2);

        backend.delete("encryption", "host-1").await.unwrap();
        let kept = backend.find("conversion", "host-1").await.unwrap().unwrap();
        assert!(kept.is_active);
        assert!(backend.find("encryption", "host-1").await.unwrap().is_none());
    }
}
