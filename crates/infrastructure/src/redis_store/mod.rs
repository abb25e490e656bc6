//! Redis implementations shared by every instance of a deployment

pub mod lock;
pub mod task_cache;

use coordinator_core::{CacheConfig, CoordinatorError, CoordinatorResult};
use redis::aio::ConnectionManager;
use tracing::info;

pub use lock::RedisLockProvider;
pub use task_cache::RedisTaskCacheStore;

pub(crate) fn cache_error(e: redis::RedisError) -> CoordinatorError {
    CoordinatorError::Cache(e.to_string())
}

/// Open a connection manager and verify it with PING
pub async fn connect(config: &CacheConfig) -> CoordinatorResult<ConnectionManager> {
    info!("Connecting to redis: {}", config.redis_url);

    let client = redis::Client::open(config.redis_url.clone()).map_err(cache_error)?;
    let mut conn = client.get_connection_manager().await.map_err(cache_error)?;

    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(cache_error)?;

    info!("Redis connection established");
    Ok(conn)
}
