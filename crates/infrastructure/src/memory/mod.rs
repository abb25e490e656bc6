//! 内存实现：单实例部署与测试使用

pub mod lock;
pub mod registration;
pub mod task_cache;

pub use lock::InMemoryLockProvider;
pub use registration::InMemoryRegistrationBackend;
pub use task_cache::InMemoryTaskCacheStore;
