//! Scoped protection settings.
//!
//! Settings live in a key/value store under `rampart/<actor>_<surface>/<field>` at one
//! of three scopes. Customer settings inherit store → website → default; admin
//! protection is global and only ever reads the default scope.
//!
//! Every numeric setting distinguishes three states, see [`Threshold`]: an unset or
//! empty value falls back to a hardcoded default, an explicit `0` disables the
//! feature, and a positive number configures it.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::ConfigError,
    repositories::ConfigRepository,
    storage::{Surface, UserType},
};

pub const DEFAULT_DELAY_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY_SECONDS: u32 = 30;
pub const DEFAULT_LOCKOUT_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_MINUTES: u32 = 30;

/// Configuration paths used by the protection layer.
pub mod paths {
    use crate::storage::{Surface, UserType};

    pub const DELAY_ATTEMPTS: &str = "delay_attempts";
    pub const DELAY_SECONDS: &str = "delay_seconds";
    pub const LOCKOUT_ATTEMPTS: &str = "lockout_attempts";
    pub const LOCKOUT_MINUTES: &str = "lockout_minutes";
    pub const PERMANENT_ATTEMPTS: &str = "permanent_attempts";
    pub const NOTIFY_ADMIN: &str = "notify_admin";
    pub const NOTIFY_EMAIL: &str = "notify_email";
    pub const EMAIL_TEMPLATE: &str = "email_template";

    /// Where the installation's sealing token is kept.
    pub const ENCRYPTION_TOKEN: &str = "rampart/security/encryption_token";

    /// `rampart/<actor>_<surface>/<field>`
    pub fn setting(user_type: UserType, surface: Surface, field: &str) -> String {
        format!("rampart/{user_type}_{surface}/{field}")
    }

    pub fn restriction_quota(category: &str) -> String {
        format!("rampart/restriction_quota/{category}")
    }

    pub fn notification_limit(key: &str) -> String {
        format!("rampart/notification_limit/{key}")
    }
}

/// A level of the configuration hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigScope {
    Default,
    Website(i64),
    Store(i64),
}

impl ConfigScope {
    /// Scope name as persisted: `default`, `websites` or `stores`.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigScope::Default => "default",
            ConfigScope::Website(_) => "websites",
            ConfigScope::Store(_) => "stores",
        }
    }

    /// Scope id as persisted; the default scope uses 0.
    pub fn id(&self) -> i64 {
        match self {
            ConfigScope::Default => 0,
            ConfigScope::Website(id) | ConfigScope::Store(id) => *id,
        }
    }
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.id())
    }
}

/// The store and website an attempt was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreScope {
    pub website_id: Option<i64>,
    pub store_id: Option<i64>,
}

impl StoreScope {
    /// No store context; resolves straight to the default scope.
    pub fn global() -> Self {
        Self::default()
    }

    pub fn website(website_id: i64) -> Self {
        Self {
            website_id: Some(website_id),
            store_id: None,
        }
    }

    pub fn store(website_id: i64, store_id: i64) -> Self {
        Self {
            website_id: Some(website_id),
            store_id: Some(store_id),
        }
    }

    /// Scopes to consult for a setting, most specific first.
    pub fn lookup_chain(&self, user_type: UserType) -> Vec<ConfigScope> {
        let mut chain = Vec::with_capacity(3);
        if user_type == UserType::Customer {
            if let Some(store_id) = self.store_id {
                chain.push(ConfigScope::Store(store_id));
            }
            if let Some(website_id) = self.website_id {
                chain.push(ConfigScope::Website(website_id));
            }
        }
        chain.push(ConfigScope::Default);
        chain
    }
}

/// A numeric setting as the operator left it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// Explicit `0`: the feature is off.
    Disabled,
    /// Unset or empty: use the hardcoded default.
    Default,
    Configured(NonZeroU32),
}

impl Threshold {
    /// Parse a raw stored value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for anything that is not empty or a
    /// non-negative integer.
    pub fn parse(path: &str, raw: Option<&str>) -> Result<Self, ConfigError> {
        let Some(raw) = raw.map(str::trim) else {
            return Ok(Threshold::Default);
        };
        if raw.is_empty() {
            return Ok(Threshold::Default);
        }

        let value: u32 = raw.parse().map_err(|_| ConfigError::InvalidValue {
            path: path.to_string(),
            value: raw.to_string(),
        })?;

        Ok(NonZeroU32::new(value).map_or(Threshold::Disabled, Threshold::Configured))
    }

    /// The effective value, or `None` when the feature is off.
    pub fn resolve(self, default: Option<u32>) -> Option<u32> {
        match self {
            Threshold::Disabled => None,
            Threshold::Default => default,
            Threshold::Configured(value) => Some(value.get()),
        }
    }
}

/// Attempt threshold and cooldown of the delay feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    pub attempts: u32,
    pub duration: Duration,
}

/// Attempt threshold and duration of the temporary lock feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub attempts: u32,
    pub duration: Duration,
}

/// Fully resolved settings for one actor and surface at one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionSettings {
    pub delay: Option<DelayPolicy>,
    pub lockout: Option<LockPolicy>,
    /// Admin login only.
    pub permanent_attempts: Option<u32>,
    pub notify_admin: bool,
    pub notify_email: bool,
    pub email_template: String,
}

impl ProtectionSettings {
    /// Settings used when nothing is stored at any scope.
    pub fn defaults(user_type: UserType, surface: Surface) -> Self {
        Self {
            delay: Some(DelayPolicy {
                attempts: DEFAULT_DELAY_ATTEMPTS,
                duration: Duration::seconds(DEFAULT_DELAY_SECONDS.into()),
            }),
            lockout: Some(LockPolicy {
                attempts: DEFAULT_LOCKOUT_ATTEMPTS,
                duration: Duration::minutes(DEFAULT_LOCKOUT_MINUTES.into()),
            }),
            permanent_attempts: None,
            notify_admin: true,
            notify_email: true,
            email_template: default_email_template(user_type, surface),
        }
    }

    /// True when no protective action can ever be taken.
    pub fn is_disabled(&self) -> bool {
        self.delay.is_none() && self.lockout.is_none() && self.permanent_attempts.is_none()
    }

    /// Position of the `attempts`-th failure within the current lock cycle.
    ///
    /// Counts are cumulative across lock cycles, so with a lock threshold of 5 the
    /// 5th, 10th, 15th... failures all land on position 5. Without an active lock the
    /// count is used as is.
    pub fn cycle_position(&self, attempts: u32, lock_active: bool) -> u32 {
        match self.lockout {
            Some(lock) if lock_active && attempts > 0 => (attempts - 1) % lock.attempts + 1,
            _ => attempts,
        }
    }
}

pub fn default_email_template(user_type: UserType, surface: Surface) -> String {
    format!("rampart_{user_type}_{surface}_lockout")
}

/// Reads protection settings with scope inheritance.
pub struct ConfigResolver<C: ConfigRepository> {
    repository: Arc<C>,
}

impl<C: ConfigRepository> Clone for ConfigResolver<C> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<C: ConfigRepository> ConfigResolver<C> {
    pub fn new(repository: Arc<C>) -> Self {
        Self { repository }
    }

    /// Look up a raw value, walking the inheritance chain for `user_type`.
    ///
    /// Admin settings are read from the default scope only, whatever `scope` says.
    pub async fn get(
        &self,
        path: &str,
        user_type: UserType,
        scope: StoreScope,
    ) -> Result<Option<String>, Error> {
        for level in scope.lookup_chain(user_type) {
            if let Some(value) = self.repository.read(path, level).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Resolve every setting for one actor and surface.
    pub async fn settings(
        &self,
        user_type: UserType,
        surface: Surface,
        scope: StoreScope,
    ) -> Result<ProtectionSettings, Error> {
        let delay_attempts = self
            .threshold(user_type, surface, scope, paths::DELAY_ATTEMPTS)
            .await?
            .resolve(Some(DEFAULT_DELAY_ATTEMPTS));
        let delay_seconds = self
            .threshold(user_type, surface, scope, paths::DELAY_SECONDS)
            .await?
            .resolve(Some(DEFAULT_DELAY_SECONDS));
        let lockout_attempts = self
            .threshold(user_type, surface, scope, paths::LOCKOUT_ATTEMPTS)
            .await?
            .resolve(Some(DEFAULT_LOCKOUT_ATTEMPTS));
        let lockout_minutes = self
            .threshold(user_type, surface, scope, paths::LOCKOUT_MINUTES)
            .await?
            .resolve(Some(DEFAULT_LOCKOUT_MINUTES));

        let permanent_attempts = if user_type == UserType::Admin && surface == Surface::Login {
            self.threshold(user_type, surface, scope, paths::PERMANENT_ATTEMPTS)
                .await?
                .resolve(None)
        } else {
            None
        };

        let delay = delay_attempts
            .zip(delay_seconds)
            .map(|(attempts, seconds)| DelayPolicy {
                attempts,
                duration: Duration::seconds(seconds.into()),
            });
        let lockout = lockout_attempts
            .zip(lockout_minutes)
            .map(|(attempts, minutes)| LockPolicy {
                attempts,
                duration: Duration::minutes(minutes.into()),
            });

        let notify_admin = self
            .flag(user_type, surface, scope, paths::NOTIFY_ADMIN, true)
            .await?;
        let notify_email = self
            .flag(user_type, surface, scope, paths::NOTIFY_EMAIL, true)
            .await?;

        let template_path = paths::setting(user_type, surface, paths::EMAIL_TEMPLATE);
        let email_template = self
            .get(&template_path, user_type, scope)
            .await?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default_email_template(user_type, surface));

        Ok(ProtectionSettings {
            delay,
            lockout,
            permanent_attempts,
            notify_admin,
            notify_email,
            email_template,
        })
    }

    async fn threshold(
        &self,
        user_type: UserType,
        surface: Surface,
        scope: StoreScope,
        field: &str,
    ) -> Result<Threshold, Error> {
        let path = paths::setting(user_type, surface, field);
        let raw = self.get(&path, user_type, scope).await?;

        match Threshold::parse(&path, raw.as_deref()) {
            Ok(threshold) => Ok(threshold),
            Err(e) => {
                tracing::warn!(error = %e, path = %path, "Ignoring malformed setting, using default");
                Ok(Threshold::Default)
            }
        }
    }

    async fn flag(
        &self,
        user_type: UserType,
        surface: Surface,
        scope: StoreScope,
        field: &str,
        default: bool,
    ) -> Result<bool, Error> {
        let path = paths::setting(user_type, surface, field);
        let raw = self.get(&path, user_type, scope).await?;

        let value = match raw.as_deref().map(str::trim) {
            None | Some("") => default,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                tracing::warn!(path = %path, value = %other, "Ignoring malformed flag, using default");
                default
            }
        };

        Ok(value)
    }
}
