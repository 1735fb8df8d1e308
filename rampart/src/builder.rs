//! Builder pattern for constructing Rampart instances
//!
//! This module provides a type-safe builder for creating [`Rampart`] instances with
//! compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use rampart::{ConfigScope, RampartBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rampart = RampartBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .apply_migrations(true)
//!         .with_setting("rampart/customer_login/lockout_attempts", "10", ConfigScope::Default)
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use rampart_core::{
    AdminNotifier, ConfigScope, LogNotifier, Mailer, NotificationKey, QuotaCategory,
    RepositoryProvider, repositories::ConfigRepository,
};

use crate::{AccountDirectory, Rampart};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when building a Rampart instance.
#[derive(Debug, thiserror::Error)]
pub enum RampartBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Failed to write the configured settings or limits
    #[error("Failed to seed configuration: {0}")]
    Seed(String),
}

// ============================================================================
// Type-State Markers
// ============================================================================

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`RampartBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

// ============================================================================
// Builder Implementation
// ============================================================================

/// A type-safe builder for constructing [`Rampart`] instances.
///
/// # Type States
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<R>`]: Storage configured, ready to build or add more configuration
pub struct RampartBuilder<Storage> {
    storage: Storage,
    apply_migrations: bool,
    mailer: Option<Arc<dyn Mailer>>,
    admin_notifier: Option<Arc<dyn AdminNotifier>>,
    directory: Option<Arc<dyn AccountDirectory>>,
    settings: Vec<(String, String, ConfigScope)>,
    quota_limits: Vec<(QuotaCategory, Option<u32>)>,
    notification_limits: Vec<(NotificationKey, Option<u32>)>,
}

impl Default for RampartBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl RampartBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    ///
    /// # Defaults
    ///
    /// - Apply migrations: false
    /// - Notifications: logged, not delivered
    /// - Restriction quotas and notification ceilings: unlimited
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            apply_migrations: false,
            mailer: None,
            admin_notifier: None,
            directory: None,
            settings: Vec::new(),
            quota_limits: Vec::new(),
            notification_limits: Vec::new(),
        }
    }

    /// Use a custom repository provider.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> RampartBuilder<WithStorage<R>> {
        RampartBuilder {
            storage: WithStorage { repositories },
            apply_migrations: self.apply_migrations,
            mailer: self.mailer,
            admin_notifier: self.admin_notifier,
            directory: self.directory,
            settings: self.settings,
            quota_limits: self.quota_limits,
            notification_limits: self.notification_limits,
        }
    }
}

// ============================================================================
// Storage Configuration Methods (NoStorage -> WithStorage)
// ============================================================================

#[cfg(feature = "sqlite")]
impl RampartBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// The database file is created if it does not exist.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<
        RampartBuilder<WithStorage<rampart_storage_sqlite::SqliteRepositoryProvider>>,
        RampartBuilderError,
    > {
        let storage = rampart_storage_sqlite::SqliteStorage::connect(url)
            .await
            .map_err(|e| RampartBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_repositories(Arc::new(storage.into_repository_provider())))
    }

    /// Configure SQLite storage with an existing connection pool.
    ///
    /// # Arguments
    ///
    /// * `pool` - An existing SQLite connection pool
    pub fn with_sqlite_pool(
        self,
        pool: rampart_storage_sqlite::SqlitePool,
    ) -> RampartBuilder<WithStorage<rampart_storage_sqlite::SqliteRepositoryProvider>> {
        self.with_repositories(Arc::new(
            rampart_storage_sqlite::SqliteRepositoryProvider::new(pool),
        ))
    }
}

// ============================================================================
// Configuration Methods (available in any state)
// ============================================================================

impl<S> RampartBuilder<S> {
    /// Set whether to automatically apply database migrations during build.
    ///
    /// Default: false
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    /// Deliver lockout emails through `mailer`.
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Deliver admin alerts through `notifier`.
    pub fn with_admin_notifier(mut self, notifier: Arc<dyn AdminNotifier>) -> Self {
        self.admin_notifier = Some(notifier);
        self
    }

    /// Resolve lockout email recipients through the host's account lookup.
    pub fn with_account_directory(mut self, directory: Arc<dyn AccountDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Store a scoped setting when the instance is built.
    ///
    /// # Arguments
    ///
    /// * `path` - The setting path, e.g. `rampart/customer_login/delay_attempts`
    /// * `value` - The raw value; `"0"` disables a threshold
    /// * `scope` - Where the value applies
    pub fn with_setting(
        mut self,
        path: impl Into<String>,
        value: impl Into<String>,
        scope: ConfigScope,
    ) -> Self {
        self.settings.push((path.into(), value.into(), scope));
        self
    }

    /// Cap how many distinct identifiers a restriction category may ever act on.
    /// `None` removes the cap.
    pub fn with_quota_limit(mut self, category: QuotaCategory, max: Option<u32>) -> Self {
        self.quota_limits.push((category, max));
        self
    }

    /// Cap how many notifications a channel may ever send. `None` removes the cap.
    pub fn with_notification_limit(mut self, key: NotificationKey, max: Option<u32>) -> Self {
        self.notification_limits.push((key, max));
        self
    }
}

// ============================================================================
// Build Method (only available with storage)
// ============================================================================

impl<R: RepositoryProvider> RampartBuilder<WithStorage<R>> {
    /// Build the Rampart instance.
    ///
    /// Migrations run first when requested, then the configured settings and
    /// limits are written.
    pub async fn build(self) -> Result<Rampart<R>, RampartBuilderError> {
        let repositories = self.storage.repositories;

        if self.apply_migrations {
            repositories
                .migrate()
                .await
                .map_err(|e| RampartBuilderError::Migration(e.to_string()))?;
        }

        for (path, value, scope) in &self.settings {
            repositories
                .config()
                .write(path, value, *scope)
                .await
                .map_err(|e| RampartBuilderError::Seed(e.to_string()))?;
        }

        let mut rampart = Rampart::new(repositories);
        if self.mailer.is_some() || self.admin_notifier.is_some() {
            rampart = rampart.with_notifiers(
                self.mailer.unwrap_or_else(|| Arc::new(LogNotifier)),
                self.admin_notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            );
        }

        if let Some(directory) = self.directory {
            rampart = rampart.with_account_directory(directory);
        }

        for (category, max) in self.quota_limits {
            rampart
                .engine()
                .quota()
                .set_limit(category, max)
                .await
                .map_err(|e| RampartBuilderError::Seed(e.to_string()))?;
        }

        for (key, max) in self.notification_limits {
            rampart
                .engine()
                .throttle()
                .set_limit(key, max)
                .await
                .map_err(|e| RampartBuilderError::Seed(e.to_string()))?;
        }

        Ok(rampart)
    }
}
