use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use coordinator_core::{
    CoordinatorError, CoordinatorResult, DistributedLockGuard, DistributedLockProvider,
    TaskCacheStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::task::{DistributedJob, DistributedTask};

struct RunningJob {
    generation: u64,
    cancel: CancellationToken,
}

/// 按队列名分区的分布式任务队列
///
/// 记录存放在共享的 `TaskCacheStore` 中，所有实例都能看到进度；
/// 通过 `enqueue_task` 提交的任务在本实例上执行。
#[derive(Clone)]
pub struct DistributedTaskQueue {
    queue_name: String,
    store: Arc<dyn TaskCacheStore>,
    lock_provider: Arc<dyn DistributedLockProvider>,
    running: Arc<Mutex<HashMap<String, RunningJob>>>,
    generation: Arc<AtomicU64>,
}

impl DistributedTaskQueue {
    pub fn new(
        queue_name: impl Into<String>,
        store: Arc<dyn TaskCacheStore>,
        lock_provider: Arc<dyn DistributedLockProvider>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            store,
            lock_provider,
            running: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// 单例启动时使用的锁名
    pub fn lock_name(&self) -> String {
        format!("lock_{}", self.queue_name)
    }

    /// 获取队列锁，用于"先读后写"的临界区
    pub async fn acquire_lock(&self) -> CoordinatorResult<DistributedLockGuard> {
        self.lock_provider.try_acquire_lock(&self.lock_name()).await
    }

    /// 本实例上该任务是否仍在执行
    pub fn is_running(&self, id: &str) -> bool {
        self.running_jobs().contains_key(id)
    }

    fn running_jobs(&self) -> MutexGuard<'_, HashMap<String, RunningJob>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 只写入描述，不在本实例执行
    pub async fn insert_task<T: DistributedTask>(&self, task: &T) -> CoordinatorResult<()> {
        self.store.put(&self.queue_name, &task.to_record()?).await
    }

    /// 写入任务并在本实例上开始执行，返回写入时的快照
    #[instrument(skip_all, fields(queue = %self.queue_name, id = %task.id()))]
    pub async fn enqueue_task<T: DistributedJob>(
        &self,
        mut task: T,
        cancel: &CancellationToken,
    ) -> CoordinatorResult<T> {
        let id = task.id().to_string();
        let token = cancel.child_token();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(previous) = self.running_jobs().insert(
            id.clone(),
            RunningJob {
                generation,
                cancel: token.clone(),
            },
        ) {
            warn!("任务 {} 重复提交，取消之前的执行", id);
            previous.cancel.cancel();
        }

        task.progress_mut().start();
        if let Err(e) = self.insert_task(&task).await {
            self.forget_if_current(&id, generation);
            return Err(e);
        }

        info!("任务 {} 已加入队列 {}", id, self.queue_name);
        let snapshot = task.clone();
        let queue = self.clone();
        tokio::spawn(async move { queue.run_job(task, generation, token).await });
        Ok(snapshot)
    }

    async fn run_job<T: DistributedJob>(self, task: T, generation: u64, token: CancellationToken) {
        let id = task.id().to_string();
        let snapshot = task.clone();
        let ctx = TaskContext {
            queue: self.clone(),
            cancel: token.clone(),
        };

        let outcome = tokio::spawn(async move {
            let mut task = task;
            let result = task.run(&ctx).await;
            (task, result)
        })
        .await;

        let task = match outcome {
            Ok((mut task, Ok(()))) => {
                if !task.progress().is_completed {
                    task.progress_mut().complete();
                }
                info!("任务 {} 执行完成", id);
                task
            }
            Ok((mut task, Err(CoordinatorError::Cancelled))) => {
                task.progress_mut().cancel();
                info!("任务 {} 已取消", id);
                task
            }
            Ok((mut task, Err(e))) => {
                error!("任务 {} 执行失败: {}", id, e);
                task.progress_mut().fail(e.to_string());
                task
            }
            Err(e) => {
                error!("任务 {} 异常终止: {}", id, e);
                let mut task = snapshot;
                task.progress_mut().fail(format!("任务异常终止: {e}"));
                task
            }
        };

        if !self.forget_if_current(&id, generation) {
            debug!("任务 {} 已出队或被重新提交，跳过最终状态写入", id);
            return;
        }
        if !self.publish_changes(&task).await {
            debug!("任务 {} 的记录已不在队列 {} 中，丢弃最终状态", id, self.queue_name);
        }
    }

    fn forget_if_current(&self, id: &str, generation: u64) -> bool {
        let mut running = self.running_jobs();
        match running.get(id) {
            Some(job) if job.generation == generation => {
                running.remove(id);
                true
            }
            _ => false,
        }
    }

    /// 列出队列中类型为 `T` 的全部任务
    pub async fn get_all_tasks<T: DistributedTask>(&self) -> CoordinatorResult<Vec<T>> {
        let records = self.store.get_all(&self.queue_name).await?;

        let mut tasks = Vec::new();
        for record in records.iter().filter(|r| r.is_kind(T::KIND)) {
            match T::from_record(record) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!("队列 {} 中的任务 {} 无法解析: {}", self.queue_name, record.id, e),
            }
        }
        Ok(tasks)
    }

    pub async fn get_task<T: DistributedTask>(&self, id: &str) -> CoordinatorResult<Option<T>> {
        match self.store.get(&self.queue_name, id).await? {
            Some(record) if record.is_kind(T::KIND) => Ok(Some(T::from_record(&record)?)),
            _ => Ok(None),
        }
    }

    /// 取消本实例上的执行并删除记录，返回记录是否存在
    pub async fn dequeue_task(&self, id: &str) -> CoordinatorResult<bool> {
        if let Some(job) = self.running_jobs().remove(id) {
            job.cancel.cancel();
        }

        let removed = self.store.remove(&self.queue_name, id).await?;
        if removed {
            info!("任务 {} 已从队列 {} 移除", id, self.queue_name);
        }
        Ok(removed)
    }

    /// 用 `tasks` 一次性替换队列中类型为 `T` 的全部任务
    pub async fn set_all_tasks<T: DistributedTask>(&self, tasks: &[T]) -> CoordinatorResult<()> {
        let records = tasks
            .iter()
            .map(DistributedTask::to_record)
            .collect::<CoordinatorResult<Vec<_>>>()?;
        self.store
            .replace_kind(&self.queue_name, T::KIND, &records)
            .await
    }

    /// 写回任务当前状态，只覆盖仍在队列中的记录
    ///
    /// 返回 `false` 表示记录已被（任意实例）出队。写入失败只记录日志，按记录仍存在处理。
    pub async fn publish_changes<T: DistributedTask>(&self, task: &T) -> bool {
        let record = match task.to_record() {
            Ok(record) => record,
            Err(e) => {
                warn!("任务 {} 序列化失败，进度未发布: {}", task.id(), e);
                return true;
            }
        };

        match self.store.update_existing(&self.queue_name, &record).await {
            Ok(written) => written,
            Err(e) => {
                warn!("任务 {} 进度发布失败: {}", task.id(), e);
                true
            }
        }
    }

    pub async fn step_done<T: DistributedTask>(&self, task: &mut T) -> bool {
        task.progress_mut().step_done();
        self.publish_changes(task).await
    }

    /// 在队列锁保护下启动单例任务
    ///
    /// 已有未完成的同类任务时直接返回它；已完成的旧任务先出队再提交新任务。
    pub async fn start_singleton<T, F>(
        &self,
        factory: F,
        cancel: &CancellationToken,
    ) -> CoordinatorResult<T>
    where
        T: DistributedJob,
        F: FnOnce() -> T + Send,
    {
        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
            guard = self.acquire_lock() => guard?,
        };

        let existing = self.get_all_tasks::<T>().await?;
        if let Some(active) = existing.iter().find(|t| !t.progress().is_completed) {
            info!("队列 {} 中已有进行中的任务 {}", self.queue_name, active.id());
            return Ok(active.clone());
        }

        for finished in &existing {
            self.dequeue_task(finished.id()).await?;
        }

        self.enqueue_task(factory(), cancel).await
    }

    /// 在队列锁保护下接管无人推进的未完成任务
    ///
    /// 记录超过 `stale_after` 没有写入且不在本实例执行时，视为所属实例已退出。
    /// `reattach` 补回不随记录持久化的运行时依赖，然后任务在本实例重新执行。
    pub async fn resume_stale<T, F>(
        &self,
        stale_after: chrono::Duration,
        reattach: F,
        cancel: &CancellationToken,
    ) -> CoordinatorResult<Option<T>>
    where
        T: DistributedJob,
        F: FnOnce(&mut T) + Send,
    {
        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
            guard = self.acquire_lock() => guard?,
        };

        let cutoff = Utc::now() - stale_after;
        let records = self.store.get_all(&self.queue_name).await?;
        let Some(record) = records.iter().find(|r| {
            r.is_kind(T::KIND) && !r.is_completed && r.updated_at <= cutoff && !self.is_running(&r.id)
        }) else {
            return Ok(None);
        };

        let mut task = T::from_record(record)?;
        warn!(
            "任务 {} 自 {} 起没有进度写入，由本实例接管",
            record.id,
            record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        reattach(&mut task);
        self.enqueue_task(task, cancel).await.map(Some)
    }
}

/// 任务执行上下文
pub struct TaskContext {
    queue: DistributedTaskQueue,
    cancel: CancellationToken,
}

impl TaskContext {
    pub fn queue(&self) -> &DistributedTaskQueue {
        &self.queue
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 任务已取消时不再写入；发现记录已被其他实例出队时取消本次执行
    pub async fn publish_changes<T: DistributedTask>(&self, task: &T) {
        if self.is_cancelled() {
            debug!("任务 {} 已取消，跳过进度发布", task.id());
            return;
        }
        if !self.queue.publish_changes(task).await {
            info!(
                "任务 {} 已从队列 {} 移除，停止本实例上的执行",
                task.id(),
                self.queue.queue_name()
            );
            self.cancel.cancel();
        }
    }

    pub async fn step_done<T: DistributedTask>(&self, task: &mut T) {
        task.progress_mut().step_done();
        self.publish_changes(task).await;
    }
}
