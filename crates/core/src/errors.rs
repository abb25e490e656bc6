use thiserror::Error;

/// 协调服务错误类型定义
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("缓存存储错误: {0}")]
    Cache(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的实例ID: {0}")]
    InvalidInstanceId(String),

    #[error("获取分布式锁超时: {name}")]
    LockTimeout { name: String },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("操作已取消")]
    Cancelled,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// 是否为存储层错误（数据库或缓存）
    pub fn is_storage_error(&self) -> bool {
        matches!(self, CoordinatorError::Database(_) | CoordinatorError::Cache(_))
    }
}

/// 统一的Result类型
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoordinatorError::LockTimeout {
            name: "lock_encryption".to_string(),
        };
        assert_eq!(err.to_string(), "获取分布式锁超时: lock_encryption");

        let err = CoordinatorError::TaskNotFound {
            id: "task-1".to_string(),
        };
        assert!(err.to_string().contains("task-1"));
    }

    #[test]
    fn test_is_storage_error() {
        assert!(CoordinatorError::Cache("down".to_string()).is_storage_error());
        assert!(!CoordinatorError::Cancelled.is_storage_error());
        assert!(!CoordinatorError::Internal("x".to_string()).is_storage_error());
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: CoordinatorError = parse_err.into();
        assert!(matches!(err, CoordinatorError::Serialization(_)));
    }
}
