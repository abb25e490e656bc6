use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 实例注册信息（每个进程实例在某个角色下的心跳行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRegistration {
    pub instance_registration_id: String,
    pub worker_type_name: String,
    pub is_active: bool,
    pub last_updated: DateTime<Utc>,
    /// 乐观并发版本号，0表示尚未持久化
    #[serde(default)]
    pub version: i64,
}

impl InstanceRegistration {
    /// 创建尚未持久化的注册信息
    pub fn new(
        instance_registration_id: impl Into<String>,
        worker_type_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_registration_id: instance_registration_id.into(),
            worker_type_name: worker_type_name.into(),
            is_active: false,
            last_updated: now,
            version: 0,
        }
    }

    /// 心跳是否已超过TTL（即孤儿实例）
    pub fn is_orphan(&self, now: DateTime<Utc>, ttl_seconds: i64) -> bool {
        self.last_updated + Duration::seconds(ttl_seconds) < now
    }

    /// 是否已经写入过存储
    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }
}
