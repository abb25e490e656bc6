use async_trait::async_trait;

use crate::models::DistributedTaskRecord;
use crate::CoordinatorResult;

/// 按队列名分区的任务缓存存储
#[async_trait]
pub trait TaskCacheStore: Send + Sync {
    /// 读取队列中的全部记录
    async fn get_all(&self, queue_name: &str) -> CoordinatorResult<Vec<DistributedTaskRecord>>;

    async fn get(&self, queue_name: &str, id: &str)
        -> CoordinatorResult<Option<DistributedTaskRecord>>;

    /// 写入单条记录（同id覆盖）
    async fn put(&self, queue_name: &str, record: &DistributedTaskRecord) -> CoordinatorResult<()>;

    /// 只在记录仍存在时覆盖写入，返回是否写入
    async fn update_existing(
        &self,
        queue_name: &str,
        record: &DistributedTaskRecord,
    ) -> CoordinatorResult<bool>;

    /// 删除单条记录，返回记录是否存在
    async fn remove(&self, queue_name: &str, id: &str) -> CoordinatorResult<bool>;

    /// 用 `records` 整体替换队列中 `kind` 类型的全部记录，其他类型的记录保持不变
    async fn replace_kind(
        &self,
        queue_name: &str,
        kind: &str,
        records: &[DistributedTaskRecord],
    ) -> CoordinatorResult<()>;
}
