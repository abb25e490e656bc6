use std::fmt;

use async_trait::async_trait;

use crate::CoordinatorResult;

/// 分布式锁提供者
///
/// 返回的守卫在离开作用域时释放锁（包括提前返回和 panic 展开）。
#[async_trait]
pub trait DistributedLockProvider: Send + Sync {
    /// 获取指定名称的锁，超过提供者配置的等待时间返回 `LockTimeout`
    async fn try_acquire_lock(&self, name: &str) -> CoordinatorResult<DistributedLockGuard>;
}

/// 已持有的锁，Drop 时执行释放动作
pub struct DistributedLockGuard {
    name: String,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl DistributedLockGuard {
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for DistributedLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLockGuard")
            .field("name", &self.name)
            .field("held", &self.release.is_some())
            .finish()
    }
}

impl Drop for DistributedLockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            tracing::debug!("释放分布式锁: {}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_guard_releases_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        {
            let guard = DistributedLockGuard::new("lock_test", move || {
                flag.store(true, Ordering::SeqCst);
            });
            assert_eq!(guard.name(), "lock_test");
            assert!(!released.load(Ordering::SeqCst));
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_guard_releases_on_early_return() {
        fn guarded(released: Arc<AtomicBool>, fail: bool) -> Result<(), String> {
            let _guard = DistributedLockGuard::new("lock_test", move || {
                released.store(true, Ordering::SeqCst);
            });
            if fail {
                return Err("boom".to_string());
            }
            Ok(())
        }

        let released = Arc::new(AtomicBool::new(false));
        assert!(guarded(Arc::clone(&released), true).is_err());
        assert!(released.load(Ordering::SeqCst));
    }
}
