//! Session-scoped attempt state.
//!
//! The host owns the client session; the protection layer only needs a small typed
//! key/value capability on top of it, [`SessionStore`]. Everything kept here is a
//! per-client fast path. The durable lockout store stays authoritative across
//! sessions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    crypto::hash_identifier,
    storage::{Surface, UserType, normalize_identifier},
};

/// A value held in a client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionValue {
    Counter(u32),
    Timestamp(DateTime<Utc>),
    Flag(bool),
}

/// Typed access to the caller's session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SessionValue>, Error>;

    async fn set(&self, key: &str, value: SessionValue) -> Result<(), Error>;

    async fn remove(&self, key: &str) -> Result<(), Error>;
}

/// In-process session store backed by a concurrent map.
///
/// Cloning shares the underlying map.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    values: Arc<DashMap<String, SessionValue>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<SessionValue>, Error> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: SessionValue) -> Result<(), Error> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.values.remove(key);
        Ok(())
    }
}

/// Session keys for one identifier on one actor/surface pair.
///
/// Keys look like `customer_login_<suffix>_<hash>`, where the hash covers the
/// normalised identifier and the website id (or `default`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    namespace: String,
    digest: String,
}

impl SessionKeys {
    pub fn new(
        identifier: &str,
        user_type: UserType,
        surface: Surface,
        website_id: Option<i64>,
    ) -> Self {
        let website = website_id.map_or_else(|| "default".to_string(), |id| id.to_string());
        let digest = hash_identifier(&format!("{}{website}", normalize_identifier(identifier)));

        Self {
            namespace: format!("{user_type}_{surface}"),
            digest,
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{suffix}_{}", self.namespace, self.digest)
    }

    pub fn attempts(&self) -> String {
        self.key("attempts")
    }

    pub fn delay_until(&self) -> String {
        self.key("delay_until")
    }

    pub fn allow_once(&self) -> String {
        self.key("allow_once")
    }

    pub fn delay_limit_exceeded(&self) -> String {
        self.key("delay_limit_exceeded")
    }

    pub fn temp_lockout_limit_exceeded(&self) -> String {
        self.key("temp_lockout_limit_exceeded")
    }
}

/// Consecutive failed attempts seen by this session.
pub struct AttemptCounter<'a> {
    session: &'a dyn SessionStore,
    key: String,
}

impl<'a> AttemptCounter<'a> {
    pub fn new(session: &'a dyn SessionStore, keys: &SessionKeys) -> Self {
        Self {
            session,
            key: keys.attempts(),
        }
    }

    pub async fn peek(&self) -> Result<u32, Error> {
        match self.session.get(&self.key).await? {
            Some(SessionValue::Counter(count)) => Ok(count),
            _ => Ok(0),
        }
    }

    pub async fn increment(&self) -> Result<u32, Error> {
        let count = self.peek().await?.saturating_add(1);
        self.set(count).await?;
        Ok(count)
    }

    pub async fn set(&self, count: u32) -> Result<(), Error> {
        self.session.set(&self.key, SessionValue::Counter(count)).await
    }

    pub async fn reset(&self) -> Result<(), Error> {
        self.session.remove(&self.key).await
    }
}

/// The delay cooldown armed for this session.
///
/// When an armed cooldown elapses it is released with an allow-once marker, so the
/// attempt that comes through on the boundary is not delayed again straight away.
pub struct DelayTimer<'a> {
    session: &'a dyn SessionStore,
    until_key: String,
    allow_once_key: String,
}

impl<'a> DelayTimer<'a> {
    pub fn new(session: &'a dyn SessionStore, keys: &SessionKeys) -> Self {
        Self {
            session,
            until_key: keys.delay_until(),
            allow_once_key: keys.allow_once(),
        }
    }

    pub async fn armed_until(&self) -> Result<Option<DateTime<Utc>>, Error> {
        match self.session.get(&self.until_key).await? {
            Some(SessionValue::Timestamp(until)) => Ok(Some(until)),
            _ => Ok(None),
        }
    }

    pub async fn arm(&self, until: DateTime<Utc>) -> Result<(), Error> {
        self.session.remove(&self.allow_once_key).await?;
        self.session
            .set(&self.until_key, SessionValue::Timestamp(until))
            .await
    }

    /// Drop an elapsed cooldown and let the next attempt through.
    pub async fn release(&self) -> Result<(), Error> {
        self.session.remove(&self.until_key).await?;
        self.session
            .set(&self.allow_once_key, SessionValue::Flag(true))
            .await
    }

    /// Consume the allow-once marker.
    ///
    /// # Returns
    ///
    /// `true` if the marker was set.
    pub async fn take_allow_once(&self) -> Result<bool, Error> {
        let allowed = matches!(
            self.session.get(&self.allow_once_key).await?,
            Some(SessionValue::Flag(true))
        );
        if allowed {
            self.session.remove(&self.allow_once_key).await?;
        }
        Ok(allowed)
    }

    pub async fn clear(&self) -> Result<(), Error> {
        self.session.remove(&self.until_key).await?;
        self.session.remove(&self.allow_once_key).await
    }
}

/// Transient markers recording that a restriction quota refused this identifier.
pub struct QuotaFlags<'a> {
    session: &'a dyn SessionStore,
    delay_key: String,
    lock_key: String,
}

impl<'a> QuotaFlags<'a> {
    pub fn new(session: &'a dyn SessionStore, keys: &SessionKeys) -> Self {
        Self {
            session,
            delay_key: keys.delay_limit_exceeded(),
            lock_key: keys.temp_lockout_limit_exceeded(),
        }
    }

    pub async fn delay_limit_exceeded(&self) -> Result<bool, Error> {
        self.is_set(&self.delay_key).await
    }

    pub async fn lock_limit_exceeded(&self) -> Result<bool, Error> {
        self.is_set(&self.lock_key).await
    }

    pub async fn mark_delay_limit_exceeded(&self) -> Result<(), Error> {
        self.session
            .set(&self.delay_key, SessionValue::Flag(true))
            .await
    }

    pub async fn mark_lock_limit_exceeded(&self) -> Result<(), Error> {
        self.session.set(&self.lock_key, SessionValue::Flag(true)).await
    }

    pub async fn clear(&self) -> Result<(), Error> {
        self.session.remove(&self.delay_key).await?;
        self.session.remove(&self.lock_key).await
    }

    async fn is_set(&self, key: &str) -> Result<bool, Error> {
        Ok(matches!(
            self.session.get(key).await?,
            Some(SessionValue::Flag(true))
        ))
    }
}
