//! 文件转换轮询
//!
//! 转换本身由外部服务完成，这里只维护队列中的转换条目：主实例周期性地
//! 查询每个进行中条目的进度，并一次性写回整批状态。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coordinator_core::{Clock, ConversionConfig, CoordinatorResult};
use coordinator_election::{ActivePassiveTask, ExecutionScope};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::progress::DistributedTaskProgress;
use crate::queue::DistributedTaskQueue;
use crate::task::DistributedTask;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionTask {
    pub progress: DistributedTaskProgress,
    pub file_id: String,
    pub target_format: String,
    pub processed: bool,
    pub result: Option<String>,
    /// 最近一次观察到进度前进的时间
    pub last_progress_at: DateTime<Utc>,
}

impl ConversionTask {
    pub fn new(file_id: impl Into<String>, target_format: impl Into<String>, now: DateTime<Utc>) -> Self {
        let file_id = file_id.into();
        let target_format = target_format.into();
        let mut progress = DistributedTaskProgress::new(Self::task_id(&file_id, &target_format));
        progress.start_date_time = Some(now);

        Self {
            progress,
            file_id,
            target_format,
            processed: false,
            result: None,
            last_progress_at: now,
        }
    }

    pub fn task_id(file_id: &str, target_format: &str) -> String {
        format!("{file_id}:{target_format}")
    }
}

impl DistributedTask for ConversionTask {
    const KIND: &'static str = "conversion_task";

    fn progress(&self) -> &DistributedTaskProgress {
        &self.progress
    }

    fn progress_mut(&mut self) -> &mut DistributedTaskProgress {
        &mut self.progress
    }
}

/// 外部转换服务报告的进度
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionProgress {
    pub percentage: f64,
    pub result: Option<String>,
}

#[async_trait]
pub trait FileConverter: Send + Sync {
    async fn check_progress(&self, task: &ConversionTask) -> CoordinatorResult<ConversionProgress>;
}

/// 只在主实例上运行的转换轮询任务
pub struct ConversionPoller {
    queue: DistributedTaskQueue,
    converter: Arc<dyn FileConverter>,
    clock: Arc<dyn Clock>,
    period: Duration,
    stuck_timeout: chrono::Duration,
    completed_retention: chrono::Duration,
}

impl ConversionPoller {
    pub fn new(
        queue: DistributedTaskQueue,
        converter: Arc<dyn FileConverter>,
        clock: Arc<dyn Clock>,
        config: &ConversionConfig,
    ) -> Self {
        Self {
            queue,
            converter,
            clock,
            period: config.period(),
            stuck_timeout: chrono::Duration::seconds(config.stuck_timeout_seconds),
            completed_retention: chrono::Duration::seconds(config.completed_retention_seconds),
        }
    }

    async fn refresh(&self, task: &mut ConversionTask, now: DateTime<Utc>) {
        match self.converter.check_progress(task).await {
            Ok(reported) => {
                if reported.percentage > task.progress.percentage {
                    task.last_progress_at = now;
                }
                task.progress.set_percentage(reported.percentage);
                if reported.percentage >= 100.0 {
                    task.processed = true;
                    task.result = reported.result;
                    task.progress.complete();
                    task.progress.stop_date_time = Some(now);
                    info!("转换任务 {} 完成", task.progress.id);
                }
            }
            Err(e) => {
                warn!("转换任务 {} 进度查询失败: {}", task.progress.id, e);
                task.progress.fail(e.to_string());
                task.progress.stop_date_time = Some(now);
            }
        }

        if !task.progress.is_completed && task.last_progress_at + self.stuck_timeout < now {
            warn!(
                "转换任务 {} 停留在 {:.0}% 超过 {} 秒，标记为失败",
                task.progress.id,
                task.progress.percentage,
                self.stuck_timeout.num_seconds()
            );
            task.progress.fail(format!(
                "conversion stuck at {:.0}% since {}",
                task.progress.percentage,
                task.last_progress_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            task.progress.stop_date_time = Some(now);
        }
    }

    fn is_expired(&self, task: &ConversionTask, now: DateTime<Utc>) -> bool {
        task.progress
            .stop_date_time
            .is_some_and(|stopped| stopped + self.completed_retention < now)
    }
}

#[async_trait]
impl ActivePassiveTask for ConversionPoller {
    fn name(&self) -> &str {
        "conversion_poller"
    }

    fn execute_task_period(&self) -> Duration {
        self.period
    }

    #[instrument(skip_all, fields(iteration = scope.iteration))]
    async fn execute_task(&self, scope: ExecutionScope) -> CoordinatorResult<()> {
        // 查询外部服务时不持有队列锁，写回前在锁内重新读取并合并
        let snapshot = self.queue.get_all_tasks::<ConversionTask>().await?;
        if snapshot.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let mut refreshed = HashMap::new();
        for task in snapshot {
            if task.progress.is_completed || scope.is_cancelled() {
                continue;
            }
            let mut updated = task.clone();
            self.refresh(&mut updated, now).await;
            refreshed.insert(task.progress.id.clone(), (task, updated));
        }

        let _guard = self.queue.acquire_lock().await?;
        let current = self.queue.get_all_tasks::<ConversionTask>().await?;
        let total = current.len();
        let mut kept = Vec::with_capacity(total);
        for task in current {
            if task.progress.is_completed && self.is_expired(&task, now) {
                debug!("移除过期的转换条目 {}", task.progress.id);
                continue;
            }
            match refreshed.remove(&task.progress.id) {
                Some((seen, updated)) if seen == task => kept.push(updated),
                Some(_) => {
                    debug!("转换条目 {} 在查询期间被修改，保留最新状态", task.progress.id);
                    kept.push(task);
                }
                None => kept.push(task),
            }
        }

        self.queue.set_all_tasks(&kept).await?;
        debug!("转换轮询完成: {} 个条目, 保留 {}", total, kept.len());
        Ok(())
    }
}

/// 提交转换请求
#[derive(Clone)]
pub struct ConversionService {
    queue: DistributedTaskQueue,
    clock: Arc<dyn Clock>,
}

impl ConversionService {
    pub fn new(queue: DistributedTaskQueue, clock: Arc<dyn Clock>) -> Self {
        Self { queue, clock }
    }

    /// 加入转换队列；同一文件和格式已有未完成条目时直接返回该条目
    pub async fn enqueue(&self, file_id: &str, target_format: &str) -> CoordinatorResult<ConversionTask> {
        let id = ConversionTask::task_id(file_id, target_format);
        let _guard = self.queue.acquire_lock().await?;
        if let Some(existing) = self.queue.get_task::<ConversionTask>(&id).await? {
            if !existing.progress.is_completed {
                return Ok(existing);
            }
        }

        let task = ConversionTask::new(file_id, target_format, self.clock.now());
        self.queue.insert_task(&task).await?;
        info!("文件 {} 已加入转换队列 ({})", file_id, target_format);
        Ok(task)
    }

    pub async fn status(&self, file_id: &str, target_format: &str) -> CoordinatorResult<Option<ConversionTask>> {
        self.queue
            .get_task(&ConversionTask::task_id(file_id, target_format))
            .await
    }
}
