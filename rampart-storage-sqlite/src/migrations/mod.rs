use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Migration: Send + Sync {
    /// Execute the migration
    async fn up<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError>;

    /// Rollback the migration
    async fn down<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError>;

    /// Unique version number for ordering migrations
    fn version(&self) -> i64;

    /// Human readable name of the migration
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: i64,
}

/// Every migration this backend ships, in order.
pub fn all() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateLockedAccountsTable),
        Box::new(CreateForgotPasswordLockedAccountsTable),
        Box::new(CreateScopedConfigTable),
    ]
}

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn table_name(&self) -> &str {
        "_rampart_migrations"
    }

    pub async fn initialize(&self) -> Result<(), MigrationError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL DEFAULT (unixepoch())
            );"#,
            self.table_name()
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn up(&self, migrations: &[Box<dyn Migration>]) -> Result<(), MigrationError> {
        for migration in migrations {
            if self.is_applied(migration.version()).await? {
                continue;
            }

            let mut tx = self.pool.begin().await?;

            tracing::info!(
                "Applying migration {} ({})",
                migration.name(),
                migration.version()
            );

            migration.up(&mut *tx).await?;

            sqlx::query(&format!(
                "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
                self.table_name()
            ))
            .bind(migration.version())
            .bind(migration.name())
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }
        Ok(())
    }

    /// Roll back applied migrations, last first.
    pub async fn down(&self, migrations: &[Box<dyn Migration>]) -> Result<(), MigrationError> {
        for migration in migrations.iter().rev() {
            if !self.is_applied(migration.version()).await? {
                continue;
            }

            let mut tx = self.pool.begin().await?;

            tracing::info!(
                "Rolling back migration {} ({})",
                migration.name(),
                migration.version()
            );

            migration.down(&mut *tx).await?;

            sqlx::query(&format!("DELETE FROM {} WHERE version = ?", self.table_name()))
                .bind(migration.version())
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
        }
        Ok(())
    }

    pub async fn applied_migrations(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let records = sqlx::query_as::<_, MigrationRecord>(&format!(
            "SELECT version, name, applied_at FROM {} ORDER BY version",
            self.table_name()
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn is_applied(&self, version: i64) -> Result<bool, MigrationError> {
        let result: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE version = ?)",
            self.table_name()
        ))
        .bind(version)
        .fetch_one(&self.pool)
        .await?;
        Ok(result)
    }
}

/// Both lockout tables share one shape. Admin rows keep `website` NULL, so the
/// identity index folds NULL into a sentinel to make it unique.
async fn create_lockout_table(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<(), MigrationError> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id INTEGER,
            email TEXT NOT NULL,
            user_type TEXT NOT NULL CHECK (user_type IN ('customer', 'admin')),
            website INTEGER,
            failed_attempts INTEGER NOT NULL DEFAULT 0,
            lock_type TEXT NOT NULL DEFAULT 'none' CHECK (lock_type IN ('none', 'temporary', 'permanent')),
            lock_until INTEGER,
            first_time_lockout INTEGER,
            sent_email INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL DEFAULT (unixepoch()),
            updated_at INTEGER NOT NULL DEFAULT (unixepoch())
        );"#
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_identity \
         ON {table} (email, user_type, COALESCE(website, -1))"
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_lock_type ON {table} (lock_type)"
    ))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub struct CreateLockedAccountsTable;

#[async_trait]
impl Migration for CreateLockedAccountsTable {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "CreateLockedAccountsTable"
    }

    async fn up<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        create_lockout_table(conn, "locked_accounts").await
    }

    async fn down<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        sqlx::query("DROP TABLE IF EXISTS locked_accounts")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateForgotPasswordLockedAccountsTable;

#[async_trait]
impl Migration for CreateForgotPasswordLockedAccountsTable {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "CreateForgotPasswordLockedAccountsTable"
    }

    async fn up<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        create_lockout_table(conn, "forgot_password_locked_accounts").await
    }

    async fn down<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        sqlx::query("DROP TABLE IF EXISTS forgot_password_locked_accounts")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateScopedConfigTable;

#[async_trait]
impl Migration for CreateScopedConfigTable {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "CreateScopedConfigTable"
    }

    async fn up<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scoped_config (
                scope TEXT NOT NULL CHECK (scope IN ('default', 'websites', 'stores')),
                scope_id INTEGER NOT NULL DEFAULT 0,
                path TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (unixepoch()),
                PRIMARY KEY (scope, scope_id, path)
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(&'a self, conn: &'a mut SqliteConnection) -> Result<(), MigrationError> {
        sqlx::query("DROP TABLE IF EXISTS scoped_config")
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> SqliteMigrationManager {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");
        let manager = SqliteMigrationManager::new(pool);
        manager
            .initialize()
            .await
            .expect("Failed to initialize migrations");
        manager
    }

    #[tokio::test]
    async fn test_up_is_idempotent() {
        let manager = manager().await;
        manager.up(&all()).await.expect("Failed to run migrations");
        manager.up(&all()).await.expect("Failed to re-run migrations");

        let applied = manager.applied_migrations().await.unwrap();
        let versions: Vec<i64> = applied.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(applied[0].name, "CreateLockedAccountsTable");
    }

    #[tokio::test]
    async fn test_down_rolls_back() {
        let manager = manager().await;
        manager.up(&all()).await.unwrap();
        manager.down(&all()).await.unwrap();

        assert!(manager.applied_migrations().await.unwrap().is_empty());
        assert!(!manager.is_applied(1).await.unwrap());

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name = 'locked_accounts')",
        )
        .fetch_one(&manager.pool)
        .await
        .unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    async fn test_identity_index_treats_null_website_as_one_key() {
        let manager = manager().await;
        manager.up(&all()).await.unwrap();

        let insert = "INSERT INTO locked_accounts (email, user_type, website) VALUES ('root', 'admin', NULL)";
        sqlx::query(insert).execute(&manager.pool).await.unwrap();
        assert!(sqlx::query(insert).execute(&manager.pool).await.is_err());
    }
}
