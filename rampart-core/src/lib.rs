//! Core functionality for rampart
//!
//! This crate contains the brute-force protection state machine shared by every
//! authentication surface: the data model, scoped settings, session counters,
//! restriction quotas, notification ceilings and the [`ProtectionEngine`] that ties
//! them together.
//!
//! Storage is abstracted behind the traits in [`repositories`]; see the
//! `rampart-storage-sqlite` crate for a backend and the `rampart` crate for the
//! surface adapters.
//!
pub mod config;
pub mod crypto;
pub mod error;
pub mod repositories;
pub mod services;
pub mod session;
pub mod storage;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigResolver, ConfigScope, ProtectionSettings, StoreScope, Threshold};
pub use error::{AuthError, Error};
pub use repositories::RepositoryProvider;
pub use services::{
    AdminNotifier, LogNotifier, Mailer, NotificationChannel, NotificationKey, ProtectionContext,
    ProtectionEngine, QuotaCategory, RestrictionKind, Verdict,
};
pub use session::{MemorySessionStore, SessionStore, SessionValue};
pub use storage::{LockKind, LockType, LockoutKey, LockoutRecord, Surface, UserType};
pub use validation::Credentials;
