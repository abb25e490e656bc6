use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coordinator_core::CoordinatorResult;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::leader_elector::LeaderElector;

/// 单次调度迭代的上下文
///
/// 每轮新建，任务体只应通过它拿取本轮的取消信号。
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    pub iteration: u64,
    pub started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl ExecutionScope {
    pub fn new(iteration: u64, cancel: CancellationToken) -> Self {
        Self {
            iteration,
            started_at: Utc::now(),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// 只在主实例上周期执行的任务体
#[async_trait]
pub trait ActivePassiveTask: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// 两次执行之间的间隔
    fn execute_task_period(&self) -> Duration;

    async fn execute_task(&self, scope: ExecutionScope) -> CoordinatorResult<()>;
}

/// 主备门控调度循环
pub struct LeaderGatedScheduler {
    elector: Arc<dyn LeaderElector>,
    task: Arc<dyn ActivePassiveTask>,
    instance_id: String,
    passive_poll_interval: Duration,
}

impl LeaderGatedScheduler {
    pub fn new(
        elector: Arc<dyn LeaderElector>,
        task: Arc<dyn ActivePassiveTask>,
        instance_id: impl Into<String>,
        passive_poll_interval: Duration,
    ) -> Self {
        Self {
            elector,
            task,
            instance_id: instance_id.into(),
            passive_poll_interval,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let name = self.task.name().to_string();
        info!("后台任务 {} 启动 (实例 {})", name, self.instance_id);

        let stop_hook = {
            let cancel = cancel.clone();
            let name = name.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                info!("后台任务 {} 收到停止信号", name);
            })
        };

        let mut iteration = 0u64;
        while !cancel.is_cancelled() {
            iteration += 1;
            let scope = ExecutionScope::new(iteration, cancel.child_token());

            let delay = if self.elector.is_active(&self.instance_id).await {
                self.execute_once(scope).await;
                self.task.execute_task_period()
            } else {
                self.passive_poll_interval
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Err(e) = stop_hook.await {
            debug!("停止日志任务结束异常: {}", e);
        }
        info!("后台任务 {} 已停止", name);
    }

    async fn execute_once(&self, scope: ExecutionScope) {
        let iteration = scope.iteration;
        let task = Arc::clone(&self.task);
        let handle = tokio::spawn(async move { task.execute_task(scope).await });

        match handle.await {
            Ok(Ok(())) => debug!("后台任务 {} 第 {} 轮执行完成", self.task.name(), iteration),
            Ok(Err(e)) => error!("后台任务 {} 第 {} 轮执行失败: {}", self.task.name(), iteration, e),
            Err(e) if e.is_panic() => {
                error!("后台任务 {} 第 {} 轮执行发生panic", self.task.name(), iteration)
            }
            Err(e) => warn!("后台任务 {} 第 {} 轮被中止: {}", self.task.name(), iteration, e),
        }
    }
}
