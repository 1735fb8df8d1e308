//! Repository implementations for SQLite storage

pub mod config;
pub mod lockout;

pub use config::SqliteConfigRepository;
pub use lockout::SqliteLockoutRepository;

use async_trait::async_trait;
use rampart_core::{
    Error,
    error::StorageError,
    repositories::{ConfigRepositoryProvider, LockoutRepositoryProvider, RepositoryProvider},
};
use sqlx::SqlitePool;

use crate::migrations::{SqliteMigrationManager, all};

/// Repository provider implementation for SQLite
///
/// This struct implements all the individual repository provider traits
/// as well as the unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    lockout: SqliteLockoutRepository,
    config: SqliteConfigRepository,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            lockout: SqliteLockoutRepository::new(pool.clone()),
            config: SqliteConfigRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl LockoutRepositoryProvider for SqliteRepositoryProvider {
    type LockoutRepo = SqliteLockoutRepository;

    fn lockout(&self) -> &Self::LockoutRepo {
        &self.lockout
    }
}

impl ConfigRepositoryProvider for SqliteRepositoryProvider {
    type ConfigRepo = SqliteConfigRepository;

    fn config(&self) -> &Self::ConfigRepo {
        &self.config
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            Error::Storage(StorageError::Migration(
                "Failed to initialize migrations".to_string(),
            ))
        })?;

        manager.up(&all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            Error::Storage(StorageError::Migration(
                "Failed to run migrations".to_string(),
            ))
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        Ok(())
    }
}
