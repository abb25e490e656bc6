use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 优雅关闭管理器
///
/// 持有根取消令牌，各组件通过 `token()` 拿到子令牌，`shutdown()` 后全部收到取消。
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    root: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为一个组件分配取消令牌
    pub fn token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// 触发关闭，重复调用无副作用
    pub fn shutdown(&self) {
        if self.root.is_cancelled() {
            debug!("关闭管理器已经触发过关闭");
            return;
        }

        info!("触发系统关闭");
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.root.cancelled().await;
    }

    /// 触发关闭并在限定时间内等待 `components` 结束，返回是否按时结束
    pub async fn shutdown_and_wait<F>(&self, components: F, limit: Duration) -> bool
    where
        F: Future<Output = ()>,
    {
        self.shutdown();

        match timeout(limit, components).await {
            Ok(()) => {
                info!("所有组件已停止");
                true
            }
            Err(_) => {
                warn!("等待组件停止超时（{}秒）", limit.as_secs());
                false
            }
        }
    }
}
