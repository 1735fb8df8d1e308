//! Repository traits for the data access layer
//!
//! The engine and its services never talk to a storage driver directly. They go
//! through the traits defined here, which a storage backend implements.
//!
//! # Trait Hierarchy
//!
//! - Individual `*Repository` traits define the operations for each data domain
//! - Individual `*RepositoryProvider` traits provide access to each repository type
//! - [`RepositoryProvider`] is a supertrait combining the provider traits plus lifecycle methods

pub mod adapter;
pub mod config;
pub mod lockout;

pub use adapter::{ConfigRepositoryAdapter, LockoutRepositoryAdapter};
pub use config::ConfigRepository;
pub use lockout::LockoutRepository;

use async_trait::async_trait;

use crate::Error;

/// Provider trait for lockout repository access.
pub trait LockoutRepositoryProvider: Send + Sync + 'static {
    /// The lockout repository implementation type
    type LockoutRepo: LockoutRepository;

    /// Get the lockout repository
    fn lockout(&self) -> &Self::LockoutRepo;
}

/// Provider trait for scoped configuration access.
pub trait ConfigRepositoryProvider: Send + Sync + 'static {
    /// The config repository implementation type
    type ConfigRepo: ConfigRepository;

    /// Get the config repository
    fn config(&self) -> &Self::ConfigRepo;
}

/// Provider trait that storage implementations must implement to provide all repositories.
///
/// # Example
///
/// ```rust,ignore
/// use rampart_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl LockoutRepositoryProvider for MyStorage {
///     type LockoutRepo = MyLockoutRepository;
///     fn lockout(&self) -> &Self::LockoutRepo { &self.lockout_repo }
/// }
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider: LockoutRepositoryProvider + ConfigRepositoryProvider {
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
