//! Repository trait for durable lockout state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    storage::{LockoutKey, LockoutRecord},
};

/// Durable store of [`LockoutRecord`]s.
///
/// There is at most one row per `(identifier, user type, website, surface)`; the
/// surface selects the table. This store is the cross-session source of truth, the
/// session counters are only a fast path.
#[async_trait]
pub trait LockoutRepository: Send + Sync + 'static {
    /// Find the row for a key.
    async fn find(&self, key: &LockoutKey) -> Result<Option<LockoutRecord>, Error>;

    /// Insert the record, or update the existing row with the same identity in place.
    ///
    /// `sent_email` is forced to `false` on insert and whenever `lock_type` differs
    /// from the stored value; otherwise the stored flag is kept and the flag on
    /// `record` is ignored.
    ///
    /// # Returns
    ///
    /// The row as stored after the write.
    async fn upsert(&self, record: &LockoutRecord) -> Result<LockoutRecord, Error>;

    /// Delete the row for a key.
    ///
    /// # Returns
    ///
    /// `true` if a row was deleted.
    async fn delete(&self, key: &LockoutKey) -> Result<bool, Error>;

    /// Atomically add one to `failed_attempts` of an existing row.
    ///
    /// # Returns
    ///
    /// The new count, or `None` if there is no row for the key (no row is created).
    async fn increment_failed_attempts(
        &self,
        key: &LockoutKey,
        at: DateTime<Utc>,
    ) -> Result<Option<u32>, Error>;

    /// Set the `sent_email` flag of an existing row.
    async fn set_email_sent(&self, key: &LockoutKey, sent: bool) -> Result<(), Error>;

    /// Mark the current lockout episode as notified.
    async fn mark_email_sent(&self, key: &LockoutKey) -> Result<(), Error> {
        self.set_email_sent(key, true).await
    }

    /// Re-arm notification for the current lockout episode.
    async fn mark_email_not_sent(&self, key: &LockoutKey) -> Result<(), Error> {
        self.set_email_sent(key, false).await
    }
}
