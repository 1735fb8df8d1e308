//! Persistent data model for lockout tracking.
//!
//! A [`LockoutRecord`] is keyed by `(identifier, user type, website)` and lives in one of
//! two tables depending on the [`Surface`]: login lockouts and forgot-password lockouts
//! are tracked independently and the latter never escalate to a permanent lock.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The kind of account an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Customer,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Customer => "customer",
            UserType::Admin => "admin",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(UserType::Customer),
            "admin" => Ok(UserType::Admin),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown user type: {other}"
            ))),
        }
    }
}

/// The protected flow an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Login,
    ForgotPassword,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Login => "login",
            Surface::ForgotPassword => "forgot_password",
        }
    }

    /// Name of the table holding lockout rows for this surface.
    pub fn lockout_table(&self) -> &'static str {
        match self {
            Surface::Login => "locked_accounts",
            Surface::ForgotPassword => "forgot_password_locked_accounts",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted lock state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    #[default]
    None,
    Temporary,
    Permanent,
}

impl LockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::None => "none",
            LockType::Temporary => "temporary",
            LockType::Permanent => "permanent",
        }
    }
}

impl FromStr for LockType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(LockType::None),
            "temporary" => Ok(LockType::Temporary),
            "permanent" => Ok(LockType::Permanent),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown lock type: {other}"
            ))),
        }
    }
}

/// The kind of an active lock, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    Temporary,
    Permanent,
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKind::Temporary => f.write_str("temporarily"),
            LockKind::Permanent => f.write_str("permanently"),
        }
    }
}

/// Normalise an identifier for keying: surrounding whitespace is dropped and
/// the value is lowercased.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Identity of a lockout row.
///
/// Admin keys never carry a website; [`LockoutKey::new`] enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockoutKey {
    pub identifier: String,
    pub user_type: UserType,
    pub website_id: Option<i64>,
    pub surface: Surface,
}

impl LockoutKey {
    pub fn new(
        identifier: &str,
        user_type: UserType,
        website_id: Option<i64>,
        surface: Surface,
    ) -> Self {
        let website_id = match user_type {
            UserType::Admin => None,
            UserType::Customer => website_id,
        };

        Self {
            identifier: normalize_identifier(identifier),
            user_type,
            website_id,
            surface,
        }
    }
}

/// A durable lockout row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutRecord {
    pub customer_id: Option<i64>,
    pub identifier: String,
    pub user_type: UserType,
    pub website_id: Option<i64>,
    pub surface: Surface,
    pub failed_attempts: u32,
    pub lock_type: LockType,
    pub lock_until: Option<DateTime<Utc>>,
    pub first_time_lockout: Option<DateTime<Utc>>,
    pub sent_email: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LockoutRecord {
    /// A fresh, unlocked record for the given key.
    pub fn new(key: &LockoutKey, now: DateTime<Utc>) -> Self {
        Self {
            customer_id: None,
            identifier: key.identifier.clone(),
            user_type: key.user_type,
            website_id: key.website_id,
            surface: key.surface,
            failed_attempts: 0,
            lock_type: LockType::None,
            lock_until: None,
            first_time_lockout: None,
            sent_email: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> LockoutKey {
        LockoutKey {
            identifier: self.identifier.clone(),
            user_type: self.user_type,
            website_id: self.website_id,
            surface: self.surface,
        }
    }

    /// True if a temporary lock is still running at `now`.
    pub fn is_temporarily_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_type == LockType::Temporary && self.lock_until.is_some_and(|until| now < until)
    }

    pub fn is_permanently_locked(&self) -> bool {
        self.lock_type == LockType::Permanent
    }

    /// Seconds until the temporary lock lifts, if one is running.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.is_temporarily_locked(now) {
            return None;
        }
        self.lock_until.map(|until| (until - now).num_seconds().max(0))
    }
}
