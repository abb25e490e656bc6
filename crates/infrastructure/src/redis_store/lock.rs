//! Redis-backed distributed lock
//!
//! Acquire: `SET key token NX PX expiry`. Release: compare-and-delete script so a
//! holder whose lock already expired never deletes someone else's lock.

use std::time::Duration;

use async_trait::async_trait;
use coordinator_core::{
    CoordinatorError, CoordinatorResult, DistributedLockGuard, DistributedLockProvider,
};
use redis::aio::ConnectionManager;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cache_error;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct RedisLockProvider {
    conn: ConnectionManager,
    key_prefix: String,
    acquire_timeout: Duration,
    expiry: Duration,
}

impl RedisLockProvider {
    pub fn new(
        conn: ConnectionManager,
        key_prefix: impl Into<String>,
        acquire_timeout: Duration,
        expiry: Duration,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            acquire_timeout,
            expiry,
        }
    }

    fn lock_key(&self, name: &str) -> String {
        if self.key_prefix.is_empty() {
            format!("lock:{name}")
        } else {
            format!("{}:lock:{}", self.key_prefix, name)
        }
    }

    async fn try_set(&self, key: &str, token: &str) -> CoordinatorResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(self.expiry.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;
        Ok(reply.is_some())
    }

    fn release_in_background(conn: ConnectionManager, key: String, token: String) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No tokio runtime to release lock {}, it will expire on its own", key);
                return;
            }
        };

        handle.spawn(async move {
            let mut conn = conn;
            let result: redis::RedisResult<i64> = redis::Script::new(RELEASE_SCRIPT)
                .key(&key)
                .arg(&token)
                .invoke_async(&mut conn)
                .await;
            match result {
                Ok(1) => debug!("Released redis lock {}", key),
                Ok(_) => warn!("Redis lock {} was no longer held by this instance", key),
                Err(e) => warn!("Failed to release redis lock {}: {}", key, e),
            }
        });
    }
}

#[async_trait]
impl DistributedLockProvider for RedisLockProvider {
    async fn try_acquire_lock(&self, name: &str) -> CoordinatorResult<DistributedLockGuard> {
        let key = self.lock_key(name);
        let token = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + self.acquire_timeout;

        loop {
            if self.try_set(&key, &token).await? {
                debug!("Acquired redis lock {}", key);
                let conn = self.conn.clone();
                return Ok(DistributedLockGuard::new(name, move || {
                    Self::release_in_background(conn, key, token)
                }));
            }

            if tokio::time::Instant::now() + RETRY_INTERVAL > deadline {
                return Err(CoordinatorError::LockTimeout {
                    name: name.to_string(),
                });
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }
}
