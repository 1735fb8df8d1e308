//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    config::ConfigScope,
    error::{NotificationError, StorageError},
    repositories::{ConfigRepository, LockoutRepository},
    services::notifier::{AdminNotifier, Mailer},
    storage::{LockoutKey, LockoutRecord},
};

/// Mock lockout store; can be switched into a failing mode.
#[derive(Default)]
pub struct MockLockoutRepository {
    records: Mutex<HashMap<LockoutKey, LockoutRecord>>,
    writes: Mutex<u32>,
    failing: AtomicBool,
    failing_email_flag: AtomicBool,
}

impl MockLockoutRepository {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only writes of the `sent_email` flag.
    pub fn set_failing_email_flag(&self, failing: bool) {
        self.failing_email_flag.store(failing, Ordering::SeqCst);
    }

    pub fn row_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn write_count(&self) -> u32 {
        *self.writes.lock().unwrap()
    }

    pub fn get(&self, key: &LockoutKey) -> Option<LockoutRecord> {
        self.records.lock().unwrap().get(key).cloned()
    }

    /// Overwrite a row verbatim, bypassing upsert rules.
    pub fn put(&self, record: LockoutRecord) {
        self.records.lock().unwrap().insert(record.key(), record);
    }

    fn check(&self) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("database is unavailable".to_string()).into());
        }
        Ok(())
    }

    fn bump(&self) {
        *self.writes.lock().unwrap() += 1;
    }
}

#[async_trait]
impl LockoutRepository for MockLockoutRepository {
    async fn find(&self, key: &LockoutKey) -> Result<Option<LockoutRecord>, Error> {
        self.check()?;
        Ok(self.get(key))
    }

    async fn upsert(&self, record: &LockoutRecord) -> Result<LockoutRecord, Error> {
        self.check()?;
        self.bump();
        let mut records = self.records.lock().unwrap();
        let mut stored = record.clone();
        match records.get(&record.key()) {
            Some(existing) => {
                stored.created_at = existing.created_at;
                stored.sent_email = if existing.lock_type == record.lock_type {
                    existing.sent_email
                } else {
                    false
                };
            }
            None => stored.sent_email = false,
        }
        records.insert(stored.key(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, key: &LockoutKey) -> Result<bool, Error> {
        self.check()?;
        Ok(self.records.lock().unwrap().remove(key).is_some())
    }

    async fn increment_failed_attempts(
        &self,
        key: &LockoutKey,
        at: DateTime<Utc>,
    ) -> Result<Option<u32>, Error> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        Ok(records.get_mut(key).map(|record| {
            record.failed_attempts += 1;
            record.updated_at = at;
            record.failed_attempts
        }))
    }

    async fn set_email_sent(&self, key: &LockoutKey, sent: bool) -> Result<(), Error> {
        self.check()?;
        if self.failing_email_flag.load(Ordering::SeqCst) {
            return Err(StorageError::Database("sent_email update rejected".to_string()).into());
        }
        if let Some(record) = self.records.lock().unwrap().get_mut(key) {
            record.sent_email = sent;
        }
        Ok(())
    }
}

/// Mock scoped config store.
#[derive(Default)]
pub struct MockConfigRepository {
    values: Mutex<HashMap<(String, &'static str, i64), String>>,
}

impl MockConfigRepository {
    pub fn raw(&self, path: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap()
            .get(&(path.to_string(), "default", 0))
            .cloned()
    }
}

#[async_trait]
impl ConfigRepository for MockConfigRepository {
    async fn read(&self, path: &str, scope: ConfigScope) -> Result<Option<String>, Error> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(&(path.to_string(), scope.kind(), scope.id()))
            .cloned())
    }

    async fn write(&self, path: &str, value: &str, scope: ConfigScope) -> Result<(), Error> {
        self.values
            .lock()
            .unwrap()
            .insert((path.to_string(), scope.kind(), scope.id()), value.to_string());
        Ok(())
    }

    async fn write_if_absent(
        &self,
        path: &str,
        value: &str,
        scope: ConfigScope,
    ) -> Result<bool, Error> {
        let mut values = self.values.lock().unwrap();
        let key = (path.to_string(), scope.kind(), scope.id());
        if values.get(&key).is_some_and(|stored| !stored.trim().is_empty()) {
            return Ok(false);
        }
        values.insert(key, value.to_string());
        Ok(true)
    }

    async fn delete(&self, path: &str, scope: ConfigScope) -> Result<(), Error> {
        self.values
            .lock()
            .unwrap()
            .remove(&(path.to_string(), scope.kind(), scope.id()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub template: String,
    pub recipient: String,
    pub vars: HashMap<String, String>,
}

/// Records every email and alert it is asked to deliver.
#[derive(Default)]
pub struct RecordingNotifier {
    pub emails: Mutex<Vec<SentEmail>>,
    pub alerts: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn email_count(&self) -> usize {
        self.emails.lock().unwrap().len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingNotifier {
    async fn send_email(
        &self,
        template: &str,
        recipient: &str,
        vars: &HashMap<String, String>,
    ) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Email("smtp relay refused".to_string()));
        }
        self.emails.lock().unwrap().push(SentEmail {
            template: template.to_string(),
            recipient: recipient.to_string(),
            vars: vars.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl AdminNotifier for RecordingNotifier {
    async fn notify_admin(&self, title: &str, body: &str) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::AdminAlert("inbox unavailable".to_string()));
        }
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}
