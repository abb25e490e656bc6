//! 存储加密/解密任务
//!
//! 整个集群同一时刻只允许一个加密任务运行，启动时在队列锁下检查。
//! 进度按 `租户数 × 模块数 + 2` 步计算，前后两步是准备和收尾。

use std::sync::Arc;

use async_trait::async_trait;
use coordinator_core::{CoordinatorError, CoordinatorResult, EncryptionConfig};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::progress::DistributedTaskProgress;
use crate::queue::{DistributedTaskQueue, TaskContext};
use crate::task::{DistributedJob, DistributedTask};

/// 实际执行加密的存储层
#[async_trait]
pub trait StorageEncryptor: Send + Sync {
    async fn prepare(&self, _encrypt: bool) -> CoordinatorResult<()> {
        Ok(())
    }

    /// 处理一个租户下的一个存储模块
    async fn process_unit(&self, tenant_id: &str, module: &str, encrypt: bool)
        -> CoordinatorResult<()>;

    async fn finish(&self, _encrypt: bool) -> CoordinatorResult<()> {
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptionOperation {
    pub progress: DistributedTaskProgress,
    pub encrypt: bool,
    pub tenants: Vec<String>,
    pub modules: Vec<String>,
    /// 已处理完的 `tenant/module`
    pub processed: Vec<String>,
    #[serde(skip)]
    encryptor: Option<Arc<dyn StorageEncryptor>>,
    #[serde(skip)]
    max_parallelism: usize,
}

impl EncryptionOperation {
    pub fn new(
        encrypt: bool,
        tenants: Vec<String>,
        modules: Vec<String>,
        encryptor: Arc<dyn StorageEncryptor>,
        max_parallelism: usize,
    ) -> Self {
        Self {
            progress: DistributedTaskProgress::new(format!("encryption-{}", Uuid::new_v4())),
            encrypt,
            tenants,
            modules,
            processed: Vec::new(),
            encryptor: Some(encryptor),
            max_parallelism,
        }
    }

    pub fn step_count(&self) -> u32 {
        let units = self.tenants.len().saturating_mul(self.modules.len());
        u32::try_from(units).unwrap_or(u32::MAX).saturating_add(2)
    }

    /// 从队列读出的任务不带存储实现，接管执行前需要重新挂上
    pub fn attach(&mut self, encryptor: Arc<dyn StorageEncryptor>, max_parallelism: usize) {
        self.encryptor = Some(encryptor);
        self.max_parallelism = max_parallelism;
    }

    fn units(&self) -> Vec<(String, String)> {
        self.tenants
            .iter()
            .flat_map(|tenant| {
                self.modules
                    .iter()
                    .map(move |module| (tenant.clone(), module.clone()))
            })
            .filter(|(tenant, module)| !self.processed.contains(&format!("{tenant}/{module}")))
            .collect()
    }
}

impl DistributedTask for EncryptionOperation {
    const KIND: &'static str = "encryption_operation";

    fn progress(&self) -> &DistributedTaskProgress {
        &self.progress
    }

    fn progress_mut(&mut self) -> &mut DistributedTaskProgress {
        &mut self.progress
    }
}

#[async_trait]
impl DistributedJob for EncryptionOperation {
    async fn run(&mut self, ctx: &TaskContext) -> CoordinatorResult<()> {
        let encryptor = self
            .encryptor
            .clone()
            .ok_or_else(|| CoordinatorError::Internal("加密任务缺少存储实现".to_string()))?;
        let encrypt = self.encrypt;

        // 接管执行时已处理的单元直接计入完成步数
        self.progress.set_step_count(self.step_count());
        self.progress.done_steps = u32::try_from(self.processed.len()).unwrap_or(u32::MAX);
        ctx.publish_changes(self).await;

        encryptor.prepare(encrypt).await?;
        ctx.step_done(self).await;

        let mut pending = stream::iter(self.units())
            .map(|(tenant, module)| {
                let encryptor = Arc::clone(&encryptor);
                async move {
                    encryptor.process_unit(&tenant, &module, encrypt).await?;
                    Ok::<_, CoordinatorError>(format!("{tenant}/{module}"))
                }
            })
            .buffer_unordered(self.max_parallelism.max(1));

        loop {
            let next = tokio::select! {
                _ = ctx.cancellation_token().cancelled() => return Err(CoordinatorError::Cancelled),
                next = pending.next() => next,
            };
            let Some(unit) = next else { break };
            let unit = unit?;
            debug!("加密单元 {} 处理完成", unit);
            self.processed.push(unit);
            ctx.step_done(self).await;
        }

        encryptor.finish(encrypt).await?;
        ctx.step_done(self).await;
        info!(
            "{}任务 {} 处理了 {} 个单元",
            if encrypt { "加密" } else { "解密" },
            self.progress.id,
            self.processed.len()
        );
        Ok(())
    }
}

/// 加密任务入口
#[derive(Clone)]
pub struct EncryptionService {
    queue: DistributedTaskQueue,
    encryptor: Arc<dyn StorageEncryptor>,
    max_parallelism: usize,
    stale_after: chrono::Duration,
    cancel: CancellationToken,
}

impl EncryptionService {
    pub fn new(
        queue: DistributedTaskQueue,
        encryptor: Arc<dyn StorageEncryptor>,
        config: &EncryptionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            encryptor,
            max_parallelism: config.max_parallelism,
            stale_after: config.stale_after(),
            cancel,
        }
    }

    /// 启动加密；已有任务在运行时返回该任务，无人推进的任务先由本实例接管
    pub async fn start(
        &self,
        encrypt: bool,
        tenants: Vec<String>,
        modules: Vec<String>,
    ) -> CoordinatorResult<EncryptionOperation> {
        if let Some(resumed) = self.resume().await? {
            return Ok(resumed);
        }

        let encryptor = Arc::clone(&self.encryptor);
        let max_parallelism = self.max_parallelism;
        self.queue
            .start_singleton(
                move || EncryptionOperation::new(encrypt, tenants, modules, encryptor, max_parallelism),
                &self.cancel,
            )
            .await
    }

    /// 接管所属实例已退出的未完成任务，跳过已处理的单元继续执行
    pub async fn resume(&self) -> CoordinatorResult<Option<EncryptionOperation>> {
        let encryptor = Arc::clone(&self.encryptor);
        let max_parallelism = self.max_parallelism;
        self.queue
            .resume_stale(
                self.stale_after,
                move |operation: &mut EncryptionOperation| operation.attach(encryptor, max_parallelism),
                &self.cancel,
            )
            .await
    }

    /// 当前任务进度，优先返回未完成的任务
    pub async fn progress(&self) -> CoordinatorResult<Option<EncryptionOperation>> {
        let mut operations = self.queue.get_all_tasks::<EncryptionOperation>().await?;
        operations.sort_by_key(|op| op.progress.is_completed);
        Ok(operations.into_iter().next())
    }

    /// 停止所有未完成的加密任务，返回是否有任务被停止
    pub async fn stop(&self) -> CoordinatorResult<bool> {
        let mut stopped = false;
        for operation in self.queue.get_all_tasks::<EncryptionOperation>().await? {
            if !operation.progress.is_completed {
                stopped |= self.queue.dequeue_task(operation.id()).await?;
            }
        }
        Ok(stopped)
    }
}
