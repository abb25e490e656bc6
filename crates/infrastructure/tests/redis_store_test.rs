use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use coordinator_core::{
    CacheBackendType, CacheConfig, CoordinatorError, DistributedLockProvider,
    DistributedTaskRecord, DistributedTaskStatus, TaskCacheStore,
};
use coordinator_infrastructure::redis_store::connect;
use coordinator_infrastructure::{RedisLockProvider, RedisTaskCacheStore};
use redis::aio::ConnectionManager;
use testcontainers::ImageExt;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::Redis;

pub struct RedisTestSetup {
    #[allow(dead_code)]
    redis_container: ContainerAsync<Redis>,
    pub conn: ConnectionManager,
}

impl RedisTestSetup {
    pub async fn new() -> Result<Self> {
        let redis_container = Redis::default().with_tag("7-alpine").start().await?;
        let redis_port = redis_container.get_host_port_ipv4(6379).await?;
        let config = CacheConfig {
            backend: CacheBackendType::Redis,
            redis_url: format!("redis://localhost:{}", redis_port),
            ..CacheConfig::default()
        };
        let conn = connect(&config).await?;

        Ok(Self {
            redis_container,
            conn,
        })
    }

    pub fn store(&self, prefix: &str) -> RedisTaskCacheStore {
        RedisTaskCacheStore::new(self.conn.clone(), prefix)
    }

    pub fn locks(&self, acquire_timeout: Duration, expiry: Duration) -> RedisLockProvider {
        RedisLockProvider::new(self.conn.clone(), "coordinator", acquire_timeout, expiry)
    }
}

fn record(id: &str, kind: &str, percentage: f64) -> DistributedTaskRecord {
    DistributedTaskRecord {
        id: id.to_string(),
        kind: kind.to_string(),
        percentage,
        is_completed: false,
        exception: None,
        status: DistributedTaskStatus::Running,
        updated_at: Utc::now(),
        body: serde_json::json!({ "id": id }),
    }
}

#[tokio::test]
#[ignore] // 需要Docker启动Redis容器
async fn test_task_cache_put_update_remove() -> Result<()> {
    let setup = RedisTestSetup::new().await?;
    let store = setup.store("coordinator");

    store.put("thumbnails", &record("a", "conversion_task", 0.0)).await?;
    assert_eq!(store.get_all("thumbnails").await?.len(), 1);

    let progressed = record("a", "conversion_task", 40.0);
    assert!(store.update_existing("thumbnails", &progressed).await?);
    let stored = store.get("thumbnails", "a").await?.expect("record a");
    assert_eq!(stored.percentage, 40.0);

    assert!(store.remove("thumbnails", "a").await?);
    assert!(!store.remove("thumbnails", "a").await?);

    // 已出队的记录不能被进度写入重新创建
    assert!(!store.update_existing("thumbnails", &progressed).await?);
    assert!(store.get("thumbnails", "a").await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore] // 需要Docker启动Redis容器
async fn test_replace_kind_keeps_other_kinds() -> Result<()> {
    let setup = RedisTestSetup::new().await?;
    let store = setup.store("coordinator");

    store.put("mixed", &record("a", "conversion_task", 0.0)).await?;
    store.put("mixed", &record("b", "conversion_task", 0.0)).await?;
    store.put("mixed", &record("c", "encryption_operation", 10.0)).await?;

    store
        .replace_kind("mixed", "conversion_task", &[record("a", "conversion_task", 70.0)])
        .await?;

    let mut ids: Vec<_> = store
        .get_all("mixed")
        .await?
        .into_iter()
        .map(|r| (r.id, r.percentage))
        .collect();
    ids.sort_by(|x, y| x.0.cmp(&y.0));
    assert_eq!(ids, vec![("a".to_string(), 70.0), ("c".to_string(), 10.0)]);
    Ok(())
}

#[tokio::test]
#[ignore] // 需要Docker启动Redis容器
async fn test_key_prefix_separates_deployments() -> Result<()> {
    let setup = RedisTestSetup::new().await?;
    let blue = setup.store("blue");
    let green = setup.store("green");

    blue.put("thumbnails", &record("a", "conversion_task", 0.0)).await?;
    assert!(green.get_all("thumbnails").await?.is_empty());
    assert_eq!(blue.get_all("thumbnails").await?.len(), 1);
    Ok(())
}

#[tokio::test]
#[ignore] // 需要Docker启动Redis容器
async fn test_lock_excludes_second_holder_until_released() -> Result<()> {
    let setup = RedisTestSetup::new().await?;
    let locks = setup.locks(Duration::from_millis(500), Duration::from_secs(10));

    let guard = locks.try_acquire_lock("lock_encryption").await?;
    let second = locks.try_acquire_lock("lock_encryption").await;
    assert!(matches!(second, Err(CoordinatorError::LockTimeout { .. })));

    let other_name = locks.try_acquire_lock("lock_thumbnails").await;
    assert!(other_name.is_ok());

    drop(guard);
    let reacquired = locks.try_acquire_lock("lock_encryption").await;
    assert!(reacquired.is_ok());
    Ok(())
}

#[tokio::test]
#[ignore] // 需要Docker启动Redis容器
async fn test_expired_holder_does_not_release_new_holder() -> Result<()> {
    let setup = RedisTestSetup::new().await?;
    let short_lived = setup.locks(Duration::from_millis(500), Duration::from_millis(200));
    let long_lived = setup.locks(Duration::from_millis(300), Duration::from_secs(10));

    let stale = short_lived.try_acquire_lock("lock_encryption").await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let current = long_lived.try_acquire_lock("lock_encryption").await?;
    drop(stale);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let third = long_lived.try_acquire_lock("lock_encryption").await;
    assert!(matches!(third, Err(CoordinatorError::LockTimeout { .. })));

    drop(current);
    Ok(())
}
