//! SQLite implementation of the scoped configuration store.

use async_trait::async_trait;
use chrono::Utc;
use rampart_core::{
    Error, config::ConfigScope, error::utilities::DatabaseResultExt,
    repositories::ConfigRepository,
};
use sqlx::SqlitePool;

pub struct SqliteConfigRepository {
    pool: SqlitePool,
}

impl SqliteConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigRepository for SqliteConfigRepository {
    async fn read(&self, path: &str, scope: ConfigScope) -> Result<Option<String>, Error> {
        sqlx::query_scalar("SELECT value FROM scoped_config WHERE scope = ? AND scope_id = ? AND path = ?")
            .bind(scope.kind())
            .bind(scope.id())
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_db_err_with_context("Failed to read config value")
    }

    async fn write(&self, path: &str, value: &str, scope: ConfigScope) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO scoped_config (scope, scope_id, path, value, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(scope, scope_id, path) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(scope.kind())
        .bind(scope.id())
        .bind(path)
        .bind(value)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to write config value")?;

        tracing::debug!(path, scope = %scope, "Config value written");
        Ok(())
    }

    async fn write_if_absent(
        &self,
        path: &str,
        value: &str,
        scope: ConfigScope,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO scoped_config (scope, scope_id, path, value, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(scope, scope_id, path) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            WHERE trim(scoped_config.value) = ''
            "#,
        )
        .bind(scope.kind())
        .bind(scope.id())
        .bind(path)
        .bind(value)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to write config value")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, path: &str, scope: ConfigScope) -> Result<(), Error> {
        sqlx::query("DELETE FROM scoped_config WHERE scope = ? AND scope_id = ? AND path = ?")
            .bind(scope.kind())
            .bind(scope.id())
            .bind(path)
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to delete config value")?;
        Ok(())
    }
}
