pub mod database;
pub mod memory;
pub mod redis_store;

pub use database::{create_sqlite_pool, run_migrations, SqliteRegistrationBackend};
pub use memory::{InMemoryLockProvider, InMemoryRegistrationBackend, InMemoryTaskCacheStore};
pub use redis_store::{RedisLockProvider, RedisTaskCacheStore};
