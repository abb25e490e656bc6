use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 实例注册表后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationBackendType {
    Memory,
    Sqlite,
}

/// 主备选举配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// 单实例部署模式：关闭选举，所有实例都视为活跃
    pub singleton_mode: bool,
    /// 心跳超过该时长的实例视为孤儿并被清理
    pub time_until_unregister_in_seconds: i64,
    pub heartbeat_interval_seconds: u64,
    /// 非活跃实例重新检查领导权的间隔
    pub passive_poll_interval_ms: u64,
    /// 注册写入遇到并发冲突时的最大重试次数，之后执行一次无条件写入
    pub max_conflict_retries: u32,
    pub lock_timeout_seconds: u64,
    pub registration_backend: RegistrationBackendType,
    /// 实例ID前缀，为空时使用 "coordinator"
    pub instance_prefix: String,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            singleton_mode: false,
            time_until_unregister_in_seconds: 30,
            heartbeat_interval_seconds: 5,
            passive_poll_interval_ms: 1000,
            max_conflict_retries: 10,
            lock_timeout_seconds: 30,
            registration_backend: RegistrationBackendType::Sqlite,
            instance_prefix: "coordinator".to_string(),
        }
    }
}

impl CoordinationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.time_until_unregister_in_seconds <= 0 {
            return Err(anyhow::anyhow!("孤儿实例超时时间必须大于0"));
        }

        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        // 心跳间隔不小于TTL时，存活实例会被误判为孤儿
        if self.heartbeat_interval_seconds as i64 >= self.time_until_unregister_in_seconds {
            return Err(anyhow::anyhow!(
                "心跳间隔({}秒)必须小于孤儿实例超时时间({}秒)",
                self.heartbeat_interval_seconds,
                self.time_until_unregister_in_seconds
            ));
        }

        if self.passive_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("领导权轮询间隔必须大于0"));
        }

        if self.lock_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("锁等待超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn passive_poll_interval(&self) -> Duration {
        Duration::from_millis(self.passive_poll_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }
}
