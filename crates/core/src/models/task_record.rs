use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 分布式任务状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributedTaskStatus {
    #[default]
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "CANCELED")]
    Canceled,
    #[serde(rename = "FAILED")]
    Failed,
}

impl DistributedTaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DistributedTaskStatus::Completed
                | DistributedTaskStatus::Canceled
                | DistributedTaskStatus::Failed
        )
    }
}

/// 队列中持久化的任务记录
///
/// 公共进度字段平铺在外层，方便不关心具体任务类型的轮询方读取；
/// `body` 保存具体任务的完整序列化内容。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedTaskRecord {
    pub id: String,
    pub kind: String,
    pub percentage: f64,
    pub is_completed: bool,
    pub exception: Option<String>,
    pub status: DistributedTaskStatus,
    pub updated_at: DateTime<Utc>,
    pub body: serde_json::Value,
}

impl DistributedTaskRecord {
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}
