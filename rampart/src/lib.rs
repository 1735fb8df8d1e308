//! # Rampart
//!
//! Rampart protects login and password reset surfaces against brute force and
//! credential stuffing. Failed attempts are counted per identifier; past configurable
//! thresholds an identifier is first slowed down with a cooldown, then temporarily
//! locked, and for administrators optionally locked for good.
//!
//! The protection state machine lives in [`rampart_core`]. This crate wires it to a
//! storage backend and provides one adapter per surface:
//!
//! | | Interactive | API |
//! |---|---|---|
//! | Customer login | [`Rampart::customer_login`] | [`Rampart::customer_token`] |
//! | Admin login | [`Rampart::admin_login`] | [`Rampart::admin_token`] |
//! | Customer forgot password | [`Rampart::customer_forgot_password`] | [`Rampart::customer_forgot_password_api`] |
//! | Admin forgot password | [`Rampart::admin_forgot_password`] | [`Rampart::admin_forgot_password_api`] |
//!
//! ## Storage Support
//!
//! - SQLite (`sqlite` feature, enabled by default)
//!
//! ## Example
//!
//! ```rust,no_run
//! use rampart::{Credentials, MemorySessionStore, RampartBuilder, StoreScope};
//!
//! # async fn example(authenticator: impl rampart::Authenticator) -> Result<(), Box<dyn std::error::Error>> {
//! let rampart = RampartBuilder::new()
//!     .with_sqlite("sqlite://rampart.db")
//!     .await?
//!     .apply_migrations(true)
//!     .build()
//!     .await?;
//!
//! let session = MemorySessionStore::new();
//! let credentials = Credentials::new("alice@example.com", "hunter2");
//! let response = rampart
//!     .customer_login(&authenticator, &credentials, StoreScope::website(1), &session)
//!     .await;
//! # Ok(())
//! # }
//! ```
pub mod adapters;
pub mod builder;
pub mod messages;

use std::sync::Arc;

use rampart_core::{
    AdminNotifier, Mailer, ProtectionEngine, RepositoryProvider,
    repositories::{ConfigRepositoryAdapter, LockoutRepositoryAdapter},
};

use crate::adapters::{Attempt, guard_login, guard_reset, interactive};

pub use adapters::{
    AccountContact, AccountDirectory, ApiAuthError, AuthOutcome, Authenticator,
    InteractiveResponse, PasswordResetRequester,
};
pub use builder::{RampartBuilder, RampartBuilderError};

/// Re-export core types from rampart_core
pub use rampart_core::{
    AuthError, ConfigScope, Credentials, LockKind, LockType, LockoutKey, LockoutRecord,
    LogNotifier, MemorySessionStore, NotificationChannel, NotificationKey, QuotaCategory,
    RestrictionKind, SessionStore, StoreScope, Surface, UserType, Verdict,
};

/// Re-export storage backends
#[cfg(feature = "sqlite")]
pub use rampart_storage_sqlite::{SqliteRepositoryProvider, SqliteStorage};

/// Errors from administrative operations.
///
/// Surface operations never fail this way: infrastructure errors there are logged
/// and the attempt is allowed.
#[derive(Debug, thiserror::Error)]
pub enum RampartError {
    /// Error when interacting with storage
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// The engine type a [`Rampart`] runs over provider `R`.
pub type Engine<R> = ProtectionEngine<LockoutRepositoryAdapter<R>, ConfigRepositoryAdapter<R>>;

/// The coordinator that binds the protection engine to a storage backend and
/// exposes one operation per protected surface.
pub struct Rampart<R: RepositoryProvider> {
    repositories: Arc<R>,
    engine: Engine<R>,
    api_session: MemorySessionStore,
    directory: Option<Arc<dyn AccountDirectory>>,
}

impl<R: RepositoryProvider> Rampart<R> {
    /// Create a new Rampart instance with a repository provider
    ///
    /// Notifications are logged until [`Rampart::with_notifiers`] is called.
    pub fn new(repositories: Arc<R>) -> Self {
        let engine = ProtectionEngine::new(
            Arc::new(LockoutRepositoryAdapter::new(repositories.clone())),
            Arc::new(ConfigRepositoryAdapter::new(repositories.clone())),
        );

        Self {
            repositories,
            engine,
            api_session: MemorySessionStore::new(),
            directory: None,
        }
    }

    /// Look up lockout email recipients and account ids through the host.
    pub fn with_account_directory(mut self, directory: Arc<dyn AccountDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Deliver lockout notifications through the host's mailer and admin inbox.
    pub fn with_notifiers(
        mut self,
        mailer: Arc<dyn Mailer>,
        admin_notifier: Arc<dyn AdminNotifier>,
    ) -> Self {
        self.engine = self.engine.with_notifiers(mailer, admin_notifier);
        self
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), RampartError> {
        self.repositories
            .migrate()
            .await
            .map_err(|e| RampartError::StorageError(e.to_string()))
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), RampartError> {
        self.repositories
            .health_check()
            .await
            .map_err(|e| RampartError::StorageError(e.to_string()))
    }

    pub fn engine(&self) -> &Engine<R> {
        &self.engine
    }

    pub fn repositories(&self) -> &Arc<R> {
        &self.repositories
    }

    async fn contact(
        &self,
        user_type: UserType,
        identifier: &str,
        scope: StoreScope,
    ) -> Option<AccountContact> {
        let directory = self.directory.as_ref()?;
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }
        directory.find(user_type, identifier, scope.website_id).await
    }

    /// The session store shared by all stateless API attempts.
    pub fn api_session(&self) -> &dyn SessionStore {
        &self.api_session
    }

    /// Guard a storefront login form post.
    ///
    /// # Arguments
    ///
    /// * `authenticator` - The host's credential check
    /// * `credentials` - The submitted username and password
    /// * `scope` - The store the form was posted to
    /// * `session` - The visitor's session
    pub async fn customer_login<A: Authenticator + ?Sized>(
        &self,
        authenticator: &A,
        credentials: &Credentials,
        scope: StoreScope,
        session: &dyn SessionStore,
    ) -> InteractiveResponse<A::Principal> {
        let contact = self
            .contact(UserType::Customer, credentials.identifier(), scope)
            .await;
        let outcome = guard_login(
            &self.engine,
            Attempt::customer(scope, session).with_contact(contact.as_ref()),
            authenticator,
            credentials,
        )
        .await;
        InteractiveResponse::render(outcome, interactive::CUSTOMER_LOGIN_PATH)
    }

    /// Guard an admin panel login form post.
    pub async fn admin_login<A: Authenticator + ?Sized>(
        &self,
        authenticator: &A,
        credentials: &Credentials,
        session: &dyn SessionStore,
    ) -> InteractiveResponse<A::Principal> {
        let contact = self
            .contact(UserType::Admin, credentials.identifier(), StoreScope::global())
            .await;
        let outcome = guard_login(
            &self.engine,
            Attempt::admin(session).with_contact(contact.as_ref()),
            authenticator,
            credentials,
        )
        .await;
        InteractiveResponse::render(outcome, interactive::ADMIN_LOGIN_PATH)
    }

    /// Guard a customer token request.
    pub async fn customer_token<A: Authenticator + ?Sized>(
        &self,
        authenticator: &A,
        credentials: &Credentials,
        scope: StoreScope,
    ) -> Result<A::Principal, ApiAuthError> {
        let contact = self
            .contact(UserType::Customer, credentials.identifier(), scope)
            .await;
        let outcome = guard_login(
            &self.engine,
            Attempt::customer(scope, &self.api_session).with_contact(contact.as_ref()),
            authenticator,
            credentials,
        )
        .await;
        ApiAuthError::from_outcome(outcome)
    }

    /// Guard an admin token request.
    pub async fn admin_token<A: Authenticator + ?Sized>(
        &self,
        authenticator: &A,
        credentials: &Credentials,
    ) -> Result<A::Principal, ApiAuthError> {
        let contact = self
            .contact(UserType::Admin, credentials.identifier(), StoreScope::global())
            .await;
        let outcome = guard_login(
            &self.engine,
            Attempt::admin(&self.api_session).with_contact(contact.as_ref()),
            authenticator,
            credentials,
        )
        .await;
        ApiAuthError::from_outcome(outcome)
    }

    /// Guard a storefront forgot-password form post.
    pub async fn customer_forgot_password<Q: PasswordResetRequester + ?Sized>(
        &self,
        requester: &Q,
        identifier: &str,
        scope: StoreScope,
        session: &dyn SessionStore,
    ) -> InteractiveResponse<Q::Response> {
        let contact = self.contact(UserType::Customer, identifier, scope).await;
        let outcome = guard_reset(
            &self.engine,
            Attempt::customer(scope, session).with_contact(contact.as_ref()),
            requester,
            identifier,
        )
        .await;
        InteractiveResponse::render(outcome, interactive::CUSTOMER_FORGOT_PASSWORD_PATH)
    }

    /// Guard an admin panel forgot-password form post.
    pub async fn admin_forgot_password<Q: PasswordResetRequester + ?Sized>(
        &self,
        requester: &Q,
        identifier: &str,
        session: &dyn SessionStore,
    ) -> InteractiveResponse<Q::Response> {
        let contact = self
            .contact(UserType::Admin, identifier, StoreScope::global())
            .await;
        let outcome = guard_reset(
            &self.engine,
            Attempt::admin(session).with_contact(contact.as_ref()),
            requester,
            identifier,
        )
        .await;
        InteractiveResponse::render(outcome, interactive::ADMIN_FORGOT_PASSWORD_PATH)
    }

    /// Guard a customer password reset API request.
    pub async fn customer_forgot_password_api<Q: PasswordResetRequester + ?Sized>(
        &self,
        requester: &Q,
        identifier: &str,
        scope: StoreScope,
    ) -> Result<Q::Response, ApiAuthError> {
        let contact = self.contact(UserType::Customer, identifier, scope).await;
        let outcome = guard_reset(
            &self.engine,
            Attempt::customer(scope, &self.api_session).with_contact(contact.as_ref()),
            requester,
            identifier,
        )
        .await;
        ApiAuthError::from_outcome(outcome)
    }

    /// Guard an admin password reset API request.
    pub async fn admin_forgot_password_api<Q: PasswordResetRequester + ?Sized>(
        &self,
        requester: &Q,
        identifier: &str,
    ) -> Result<Q::Response, ApiAuthError> {
        let contact = self
            .contact(UserType::Admin, identifier, StoreScope::global())
            .await;
        let outcome = guard_reset(
            &self.engine,
            Attempt::admin(&self.api_session).with_contact(contact.as_ref()),
            requester,
            identifier,
        )
        .await;
        ApiAuthError::from_outcome(outcome)
    }

    /// Get the durable lockout record for a key
    ///
    /// # Returns
    ///
    /// Returns the record if the identifier has one, otherwise `None`
    pub async fn lockout_status(
        &self,
        key: &LockoutKey,
    ) -> Result<Option<LockoutRecord>, RampartError> {
        self.engine
            .lockout_status(key)
            .await
            .map_err(|e| RampartError::StorageError(e.to_string()))
    }

    /// Unlock an account by deleting its lockout record
    ///
    /// This is the only way to lift a permanent lock. Session counters of
    /// clients that already failed are left alone; they reset on the next success.
    ///
    /// # Returns
    ///
    /// Returns `true` if a record was deleted
    pub async fn unlock_account(&self, key: &LockoutKey) -> Result<bool, RampartError> {
        self.engine
            .unlock(key)
            .await
            .map_err(|e| RampartError::StorageError(e.to_string()))
    }
}
