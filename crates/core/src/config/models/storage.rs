use serde::{Deserialize, Serialize};

/// 数据库配置（实例注册表使用SQLite）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://coordinator.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            connection_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("数据库URL不能为空"));
        }

        if !self.url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!("数据库URL必须是SQLite格式: {}", self.url));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }

        if self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!("最小连接数不能大于最大连接数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 任务缓存后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendType {
    Memory,
    Redis,
}

/// 任务缓存与分布式锁配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendType,
    pub redis_url: String,
    pub key_prefix: String,
    /// Redis锁的过期时间，持锁进程崩溃后锁自动失效
    pub lock_expiry_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendType::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "coordinator".to_string(),
            lock_expiry_seconds: 60,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == CacheBackendType::Redis {
            if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
                return Err(anyhow::anyhow!("Redis URL格式无效: {}", self.redis_url));
            }
            if self.lock_expiry_seconds == 0 {
                return Err(anyhow::anyhow!("锁过期时间必须大于0"));
            }
        }

        Ok(())
    }
}
