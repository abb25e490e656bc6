use async_trait::async_trait;

use crate::models::InstanceRegistration;
use crate::CoordinatorResult;

/// 条件写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// 写入成功，返回新的版本号
    Written(i64),
    /// 乐观并发冲突（版本不匹配、行已被删除或主键已存在）
    Conflict,
}

/// 删除结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// 实例注册行存储
///
/// 行以 `(worker_type_name, instance_registration_id)` 为主键，同一进程可以在
/// 多个角色下各有一行。只提供带冲突检测的原始读写，冲突重试策略由上层的
/// `InstanceRegistrationStore` 负责。
#[async_trait]
pub trait RegistrationBackend: Send + Sync {
    /// 插入新行，主键已存在时返回 `Conflict`
    async fn insert(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome>;

    /// 按 `registration.version` 做比较并交换更新
    async fn update(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome>;

    /// 无条件写入（存在则覆盖），返回新的版本号
    async fn upsert(&self, registration: &InstanceRegistration) -> CoordinatorResult<i64>;

    async fn find(
        &self,
        worker_type_name: &str,
        instance_id: &str,
    ) -> CoordinatorResult<Option<InstanceRegistration>>;

    async fn list_by_worker_type(
        &self,
        worker_type_name: &str,
    ) -> CoordinatorResult<Vec<InstanceRegistration>>;

    async fn delete(&self, worker_type_name: &str, instance_id: &str) -> CoordinatorResult<DeleteOutcome>;
}
