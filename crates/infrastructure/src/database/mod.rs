pub mod sqlite_registration;

use std::str::FromStr;
use std::time::Duration;

use coordinator_core::{CoordinatorError, CoordinatorResult, DatabaseConfig};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub use sqlite_registration::SqliteRegistrationBackend;

/// 创建SQLite连接池并执行迁移
pub async fn create_sqlite_pool(config: &DatabaseConfig) -> CoordinatorResult<SqlitePool> {
    info!("连接数据库: {}", config.url);

    let connect_options = SqliteConnectOptions::from_str(&config.url)
        .map_err(CoordinatorError::Database)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect_with(connect_options)
        .await
        .map_err(CoordinatorError::Database)?;

    run_migrations(&pool).await?;

    info!("数据库连接成功");
    Ok(pool)
}

/// 创建实例注册表
pub async fn run_migrations(pool: &SqlitePool) -> CoordinatorResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS instance_registrations (
            instance_registration_id TEXT NOT NULL,
            worker_type_name TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT 0,
            last_updated DATETIME NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (worker_type_name, instance_registration_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
