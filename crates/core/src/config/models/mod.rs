pub mod app_config;
pub mod coordination;
pub mod jobs;
pub mod observability;
pub mod storage;

pub use app_config::AppConfig;
pub use coordination::{CoordinationConfig, RegistrationBackendType};
pub use jobs::{ConversionConfig, EncryptionConfig};
pub use observability::ObservabilityConfig;
pub use storage::{CacheBackendType, CacheConfig, DatabaseConfig};
