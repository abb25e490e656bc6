use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coordinator_core::{
    CoordinatorError, CoordinatorResult, DistributedLockGuard, DistributedLockProvider,
};
use tracing::{debug, warn};

/// 进程内锁提供者
///
/// 每个锁名对应一个 `tokio::sync::Mutex`，只在单进程内互斥，
/// 多实例部署应使用 `RedisLockProvider`。
#[derive(Debug, Clone)]
pub struct InMemoryLockProvider {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    acquire_timeout: Duration,
}

impl InMemoryLockProvider {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            acquire_timeout,
        }
    }

    fn lock_for(&self, name: &str) -> CoordinatorResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| CoordinatorError::Internal(format!("锁表已损坏: {e}")))?;
        Ok(Arc::clone(locks.entry(name.to_string()).or_default()))
    }
}

impl Default for InMemoryLockProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl DistributedLockProvider for InMemoryLockProvider {
    async fn try_acquire_lock(&self, name: &str) -> CoordinatorResult<DistributedLockGuard> {
        let mutex = self.lock_for(name)?;

        match tokio::time::timeout(self.acquire_timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                debug!("获取进程内锁: {}", name);
                Ok(DistributedLockGuard::new(name, move || drop(guard)))
            }
            Err(_) => {
                warn!("等待进程内锁 {} 超时 ({:?})", name, self.acquire_timeout);
                Err(CoordinatorError::LockTimeout {
                    name: name.to_string(),
                })
            }
        }
    }
}
