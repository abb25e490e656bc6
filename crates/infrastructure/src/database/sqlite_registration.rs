use async_trait::async_trait;
use coordinator_core::{
    CoordinatorError, CoordinatorResult, DeleteOutcome, InstanceRegistration,
    RegistrationBackend, WriteOutcome,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

const SELECT_COLUMNS: &str =
    "SELECT instance_registration_id, worker_type_name, is_active, last_updated, version FROM instance_registrations";

pub struct SqliteRegistrationBackend {
    pool: SqlitePool,
}

impl SqliteRegistrationBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_registration(row: &sqlx::sqlite::SqliteRow) -> CoordinatorResult<InstanceRegistration> {
        Ok(InstanceRegistration {
            instance_registration_id: row.try_get("instance_registration_id")?,
            worker_type_name: row.try_get("worker_type_name")?,
            is_active: row.try_get("is_active")?,
            last_updated: row.try_get("last_updated")?,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl RegistrationBackend for SqliteRegistrationBackend {
    async fn insert(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO instance_registrations (instance_registration_id, worker_type_name, is_active, last_updated, version)
            VALUES ($1, $2, $3, $4, 1)
            ON CONFLICT(worker_type_name, instance_registration_id) DO NOTHING
            "#,
        )
        .bind(&registration.instance_registration_id)
        .bind(&registration.worker_type_name)
        .bind(registration.is_active)
        .bind(registration.last_updated)
        .execute(&self.pool)
        .await
        .map_err(CoordinatorError::Database)?;

        if result.rows_affected() == 0 {
            debug!("插入注册行冲突: {}", registration.instance_registration_id);
            return Ok(WriteOutcome::Conflict);
        }

        Ok(WriteOutcome::Written(1))
    }

    async fn update(&self, registration: &InstanceRegistration) -> CoordinatorResult<WriteOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE instance_registrations
            SET is_active = $3, last_updated = $4, version = version + 1
            WHERE instance_registration_id = $1 AND worker_type_name = $2 AND version = $5
            "#,
        )
        .bind(&registration.instance_registration_id)
        .bind(&registration.worker_type_name)
        .bind(registration.is_active)
        .bind(registration.last_updated)
        .bind(registration.version)
        .execute(&self.pool)
        .await
        .map_err(CoordinatorError::Database)?;

        if result.rows_affected() == 0 {
            debug!(
                "更新注册行冲突: {} (版本 {})",
                registration.instance_registration_id, registration.version
            );
            return Ok(WriteOutcome::Conflict);
        }

        Ok(WriteOutcome::Written(registration.version + 1))
    }

    async fn upsert(&self, registration: &InstanceRegistration) -> CoordinatorResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO instance_registrations (instance_registration_id, worker_type_name, is_active, last_updated, version)
            VALUES ($1, $2, $3, $4, 1)
            ON CONFLICT(worker_type_name, instance_registration_id) DO UPDATE SET
                is_active = excluded.is_active,
                last_updated = excluded.last_updated,
                version = instance_registrations.version + 1
            RETURNING version
            "#,
        )
        .bind(&registration.instance_registration_id)
        .bind(&registration.worker_type_name)
        .bind(registration.is_active)
        .bind(registration.last_updated)
        .fetch_one(&self.pool)
        .await
        .map_err(CoordinatorError::Database)?;

        Ok(row.try_get("version")?)
    }

    async fn find(
        &self,
        worker_type_name: &str,
        instance_id: &str,
    ) -> CoordinatorResult<Option<InstanceRegistration>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE worker_type_name = $1 AND instance_registration_id = $2"
        ))
        .bind(worker_type_name)
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoordinatorError::Database)?;

        row.as_ref().map(Self::row_to_registration).transpose()
    }

    async fn list_by_worker_type(
        &self,
        worker_type_name: &str,
    ) -> CoordinatorResult<Vec<InstanceRegistration>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE worker_type_name = $1"))
            .bind(worker_type_name)
            .fetch_all(&self.pool)
            .await
            .map_err(CoordinatorError::Database)?;

        rows.iter().map(Self::row_to_registration).collect()
    }

    async fn delete(&self, worker_type_name: &str, instance_id: &str) -> CoordinatorResult<DeleteOutcome> {
        let result = sqlx::query(
            "DELETE FROM instance_registrations WHERE worker_type_name = $1 AND instance_registration_id = $2",
        )
        .bind(worker_type_name)
        .bind(instance_id)
        .execute(&self.pool)
        .await
        .map_err(CoordinatorError::Database)?;

        if result.rows_affected() == 0 {
            return Ok(DeleteOutcome::AlreadyGone);
        }

        debug!("删除注册行成功: {} (角色 {})", instance_id, worker_type_name);
        Ok(DeleteOutcome::Deleted)
    }
}
