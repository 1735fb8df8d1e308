//! SQLite storage backend for rampart
//!
//! Provides [`SqliteRepositoryProvider`], an implementation of
//! [`rampart_core::RepositoryProvider`] backed by sqlx, together with the
//! migrations creating the `locked_accounts`, `forgot_password_locked_accounts`
//! and `scoped_config` tables.
//!
//! ```rust,ignore
//! let storage = SqliteStorage::connect("sqlite://rampart.db").await?;
//! let provider = storage.into_repository_provider();
//! provider.migrate().await?;
//! ```
pub mod migrations;
pub mod repositories;

use std::str::FromStr;

use rampart_core::{Error, error::StorageError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub use repositories::{SqliteConfigRepository, SqliteLockoutRepository, SqliteRepositoryProvider};
pub use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `database_url`, creating the database file if needed.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to SQLite");
                StorageError::Connection(e.to_string())
            })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn into_repository_provider(self) -> SqliteRepositoryProvider {
        SqliteRepositoryProvider::new(self.pool)
    }
}
