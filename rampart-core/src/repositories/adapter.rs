use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    config::ConfigScope,
    repositories::{ConfigRepository, LockoutRepository, RepositoryProvider},
    storage::{LockoutKey, LockoutRecord},
};

/// Adapter that wraps a RepositoryProvider and implements [`LockoutRepository`]
pub struct LockoutRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> LockoutRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> LockoutRepository for LockoutRepositoryAdapter<R> {
    async fn find(&self, key: &LockoutKey) -> Result<Option<LockoutRecord>, Error> {
        self.provider.lockout().find(key).await
    }

    async fn upsert(&self, record: &LockoutRecord) -> Result<LockoutRecord, Error> {
        self.provider.lockout().upsert(record).await
    }

    async fn delete(&self, key: &LockoutKey) -> Result<bool, Error> {
        self.provider.lockout().delete(key).await
    }

    async fn increment_failed_attempts(
        &self,
        key: &LockoutKey,
        at: DateTime<Utc>,
    ) -> Result<Option<u32>, Error> {
        self.provider
            .lockout()
            .increment_failed_attempts(key, at)
            .await
    }

    async fn set_email_sent(&self, key: &LockoutKey, sent: bool) -> Result<(), Error> {
        self.provider.lockout().set_email_sent(key, sent).await
    }
}

/// Adapter that wraps a RepositoryProvider and implements [`ConfigRepository`]
pub struct ConfigRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> ConfigRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> ConfigRepository for ConfigRepositoryAdapter<R> {
    async fn read(&self, path: &str, scope: ConfigScope) -> Result<Option<String>, Error> {
        self.provider.config().read(path, scope).await
    }

    async fn write(&self, path: &str, value: &str, scope: ConfigScope) -> Result<(), Error> {
        self.provider.config().write(path, value, scope).await
    }

    async fn write_if_absent(
        &self,
        path: &str,
        value: &str,
        scope: ConfigScope,
    ) -> Result<bool, Error> {
        self.provider.config().write_if_absent(path, value, scope).await
    }

    async fn delete(&self, path: &str, scope: ConfigScope) -> Result<(), Error> {
        self.provider.config().delete(path, scope).await
    }
}
