use async_trait::async_trait;
use chrono::Utc;
use coordinator_core::{CoordinatorError, CoordinatorResult, DistributedTaskRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::progress::DistributedTaskProgress;
use crate::queue::TaskContext;

/// 可存入任务队列的任务描述
pub trait DistributedTask: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// 同一队列中区分任务类型的标识
    const KIND: &'static str;

    fn progress(&self) -> &DistributedTaskProgress;

    fn progress_mut(&mut self) -> &mut DistributedTaskProgress;

    fn id(&self) -> &str {
        &self.progress().id
    }

    fn to_record(&self) -> CoordinatorResult<DistributedTaskRecord> {
        let progress = self.progress();
        Ok(DistributedTaskRecord {
            id: progress.id.clone(),
            kind: Self::KIND.to_string(),
            percentage: progress.percentage,
            is_completed: progress.is_completed,
            exception: progress.exception.clone(),
            status: progress.status,
            updated_at: Utc::now(),
            body: serde_json::to_value(self)?,
        })
    }

    fn from_record(record: &DistributedTaskRecord) -> CoordinatorResult<Self> {
        if !record.is_kind(Self::KIND) {
            return Err(CoordinatorError::Internal(format!(
                "任务 {} 类型为 {}，期望 {}",
                record.id,
                record.kind,
                Self::KIND
            )));
        }
        Ok(serde_json::from_value(record.body.clone())?)
    }
}

/// 由队列在本实例上执行的长任务
#[async_trait]
pub trait DistributedJob: DistributedTask {
    /// 执行任务体
    ///
    /// 通过 `ctx` 发布进度并观察取消。返回 `Ok` 后队列负责把任务标记为完成，
    /// 返回错误则记录到 `exception`。
    async fn run(&mut self, ctx: &TaskContext) -> CoordinatorResult<()>;
}
