pub mod utilities;

use thiserror::Error;

use crate::storage::LockKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),
}

/// Failures an authentication surface can observe.
///
/// Every user-facing variant renders a generic, time-based message. None of them
/// reveal whether the identifier belongs to an existing account.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid login or password")]
    InvalidCredentialsInput,

    #[error("Account is {kind} locked")]
    AccountLocked {
        kind: LockKind,
        remaining: Option<chrono::Duration>,
    },

    #[error("Too many attempts, retry in {remaining_seconds} seconds")]
    AccountDelayed { remaining_seconds: i64 },

    #[error("Upstream authentication failed")]
    UpstreamAuthFailure,

    /// Never surfaced to end users. The engine fails open when it sees this.
    #[error("Restriction quota exhausted for {0}")]
    QuotaExceeded(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record not found")]
    NotFound,

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {path}")]
    InvalidValue { path: String, value: String },
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Sealing failed: {0}")]
    Seal(String),

    #[error("Opening sealed value failed: {0}")]
    Open(String),
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("Admin alert failed: {0}")]
    AdminAlert(String),
}

impl Error {
    /// True for lockout and delay verdicts, the only errors that fail closed.
    pub fn is_protection_error(&self) -> bool {
        matches!(
            self,
            Error::Auth(AuthError::AccountLocked { .. }) | Error::Auth(AuthError::AccountDelayed { .. })
        )
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_crypto_error(&self) -> bool {
        matches!(self, Error::Crypto(_))
    }
}
