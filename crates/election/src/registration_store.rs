use std::sync::Arc;

use coordinator_core::{
    CoordinatorResult, DeleteOutcome, InstanceRegistration, RegistrationBackend, WriteOutcome,
};
use tracing::{debug, instrument, warn};

/// 实例注册存储
///
/// 在 `RegistrationBackend` 之上实现冲突重试：本实例的心跳写入总会落地，
/// 删除时"已被删除"视为成功。
#[derive(Clone)]
pub struct InstanceRegistrationStore {
    backend: Arc<dyn RegistrationBackend>,
    max_conflict_retries: u32,
}

impl InstanceRegistrationStore {
    pub fn new(backend: Arc<dyn RegistrationBackend>, max_conflict_retries: u32) -> Self {
        Self {
            backend,
            max_conflict_retries,
        }
    }

    /// 写入或更新注册行，返回带最新版本号的行
    ///
    /// 条件更新冲突时改为插入新行；插入也冲突时刷新版本号后再更新。
    /// 超过重试上限后做一次无条件写入。
    #[instrument(skip(self, registration), fields(instance_id = %registration.instance_registration_id))]
    pub async fn add_or_update(
        &self,
        registration: &InstanceRegistration,
    ) -> CoordinatorResult<InstanceRegistration> {
        let mut row = registration.clone();

        for attempt in 0..=self.max_conflict_retries {
            let updating = row.is_persisted();
            let outcome = if updating {
                self.backend.update(&row).await?
            } else {
                self.backend.insert(&row).await?
            };

            match outcome {
                WriteOutcome::Written(version) => {
                    row.version = version;
                    return Ok(row);
                }
                WriteOutcome::Conflict if updating => {
                    debug!("更新冲突，第 {} 次改为插入新行", attempt + 1);
                    row.version = 0;
                }
                WriteOutcome::Conflict => {
                    row.version = self
                        .backend
                        .find(&row.worker_type_name, &row.instance_registration_id)
                        .await?
                        .map(|current| current.version)
                        .unwrap_or(0);
                    debug!("插入冲突，第 {} 次刷新版本号为 {}", attempt + 1, row.version);
                }
            }
        }

        warn!(
            "注册行 {} 连续冲突 {} 次，执行无条件写入",
            row.instance_registration_id,
            self.max_conflict_retries + 1
        );
        row.version = self.backend.upsert(&row).await?;
        Ok(row)
    }

    pub async fn get_all(&self, worker_type_name: &str) -> CoordinatorResult<Vec<InstanceRegistration>> {
        self.backend.list_by_worker_type(worker_type_name).await
    }

    pub async fn find(
        &self,
        worker_type_name: &str,
        instance_id: &str,
    ) -> CoordinatorResult<Option<InstanceRegistration>> {
        self.backend.find(worker_type_name, instance_id).await
    }

    /// 幂等删除
    pub async fn delete(&self, worker_type_name: &str, instance_id: &str) -> CoordinatorResult<()> {
        if self.backend.delete(worker_type_name, instance_id).await? == DeleteOutcome::AlreadyGone {
            debug!("注册行 {} (角色 {}) 已被其他实例删除", instance_id, worker_type_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coordinator_infrastructure::InMemoryRegistrationBackend;
    use coordinator_testing_utils::{FlakyRegistrationBackend, InstanceRegistrationBuilder};

    #[tokio::test]
    async fn test_add_then_update_bumps_version() {
        let store = InstanceRegistrationStore::new(Arc::new(InMemoryRegistrationBackend::new()), 10);
        let reg = InstanceRegistrationBuilder::new().with_tick(100).build();

        let stored = store.add_or_update(&reg).await.unwrap();
        assert_eq!(stored.version, 1);

        let mut next = stored.clone();
        next.is_active = true;
        let stored = store.add_or_update(&next).await.unwrap();
        assert_eq!(stored.version, 2);
        assert!(store.find("conversion", &reg.instance_registration_id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_stale_version_still_lands() {
        let backend = InMemoryRegistrationBackend::new();
        let store = InstanceRegistrationStore::new(Arc::new(backend.clone()), 10);
        let reg = InstanceRegistrationBuilder::new().with_tick(100).build();
        store.add_or_update(&reg).await.unwrap();
        // A concurrent writer moves the row ahead
        backend.upsert(&reg).await.unwrap();
        backend.upsert(&reg).await.unwrap();

        let mut stale = reg.clone();
        stale.version = 1;
        stale.is_active = true;
        let stored = store.add_or_update(&stale).await.unwrap();

        assert_eq!(stored.version, 4);
        assert!(backend.find("conversion", &reg.instance_registration_id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_vanished_row_is_reinserted() {
        let backend = InMemoryRegistrationBackend::new();
        let store = InstanceRegistrationStore::new(Arc::new(backend.clone()), 10);
        let reg = InstanceRegistrationBuilder::new().with_tick(100).build();
        let stored = store.add_or_update(&reg).await.unwrap();
        backend.delete("conversion", &reg.instance_registration_id).await.unwrap();

        let stored = store.add_or_update(&stored).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(backend.count().await, 1);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let backend = FlakyRegistrationBackend::new(3);
        let store = InstanceRegistrationStore::new(Arc::new(backend.clone()), 10);
        let reg = InstanceRegistrationBuilder::new().with_tick(100).build();

        let stored = store.add_or_update(&reg).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(backend.conditional_writes(), 4);
        assert_eq!(backend.upserts(), 0);
    }

    #[tokio::test]
    async fn test_retry_budget_falls_back_to_upsert() {
        let backend = FlakyRegistrationBackend::new(usize::MAX);
        let store = InstanceRegistrationStore::new(Arc::new(backend.clone()), 2);
        let reg = InstanceRegistration::new("coordinator-host-7", "conversion", Utc::now());

        let stored = store.add_or_update(&reg).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(backend.conditional_writes(), 3);
        assert_eq!(backend.upserts(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InstanceRegistrationStore::new(Arc::new(InMemoryRegistrationBackend::new()), 10);
        let reg = InstanceRegistrationBuilder::new().with_tick(100).build();
        store.add_or_update(&reg).await.unwrap();

        store.delete("conversion", &reg.instance_registration_id).await.unwrap();
        store.delete("conversion", &reg.instance_registration_id).await.unwrap();
        assert!(store.get_all("conversion").await.unwrap().is_empty());
    }
}
