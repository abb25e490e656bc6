use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 文件转换轮询任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub enabled: bool,
    pub worker_type_name: String,
    pub queue_name: String,
    pub period_seconds: u64,
    /// 进度长时间停留在100%以下的条目被标记为失败
    pub stuck_timeout_seconds: i64,
    /// 已完成条目保留多久后从队列中移除
    pub completed_retention_seconds: i64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_type_name: "conversion".to_string(),
            queue_name: "thumbnail_conversion".to_string(),
            period_seconds: 1,
            stuck_timeout_seconds: 600,
            completed_retention_seconds: 300,
        }
    }
}

impl ConversionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_type_name.is_empty() {
            return Err(anyhow::anyhow!("转换任务角色名不能为空"));
        }
        if self.queue_name.is_empty() {
            return Err(anyhow::anyhow!("转换队列名不能为空"));
        }
        if self.period_seconds == 0 {
            return Err(anyhow::anyhow!("转换轮询周期必须大于0"));
        }
        if self.stuck_timeout_seconds <= 0 {
            return Err(anyhow::anyhow!("转换卡住超时时间必须大于0"));
        }
        if self.completed_retention_seconds < 0 {
            return Err(anyhow::anyhow!("已完成条目保留时间不能为负数"));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }
}

/// 存储加密任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub queue_name: String,
    /// 同时处理的租户/模块单元数
    pub max_parallelism: usize,
    /// 未完成的任务超过该时长没有进度写入时，由其他实例接管
    pub stale_after_seconds: i64,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            queue_name: "encryption".to_string(),
            max_parallelism: 4,
            stale_after_seconds: 900,
        }
    }
}

impl EncryptionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue_name.is_empty() {
            return Err(anyhow::anyhow!("加密队列名不能为空"));
        }
        if self.max_parallelism == 0 {
            return Err(anyhow::anyhow!("加密并发数必须大于0"));
        }
        if self.stale_after_seconds <= 0 {
            return Err(anyhow::anyhow!("加密任务接管阈值必须大于0"));
        }
        Ok(())
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_seconds)
    }
}
