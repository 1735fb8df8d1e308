//! SQLite implementation of the lockout repository.
//!
//! Login and forgot-password rows live in separate tables with the same shape; the
//! key's surface picks the table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rampart_core::{
    Error,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::LockoutRepository,
    storage::{LockoutKey, LockoutRecord, Surface},
};
use sqlx::SqlitePool;

const COLUMNS: &str = "customer_id, email, user_type, website, failed_attempts, lock_type, \
                       lock_until, first_time_lockout, sent_email, created_at, updated_at";

/// SQLite repository for lockout records.
pub struct SqliteLockoutRepository {
    pool: SqlitePool,
}

impl SqliteLockoutRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteLockoutRecord {
    customer_id: Option<i64>,
    email: String,
    user_type: String,
    website: Option<i64>,
    failed_attempts: i64,
    lock_type: String,
    lock_until: Option<i64>,
    first_time_lockout: Option<i64>,
    sent_email: bool,
    created_at: i64,
    updated_at: i64,
}

fn timestamp(value: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp(value, 0)
        .ok_or_else(|| StorageError::Corrupt(format!("Invalid timestamp {value}")))
}

impl SqliteLockoutRecord {
    fn into_record(self, surface: Surface) -> Result<LockoutRecord, Error> {
        let corrupt = |e: rampart_core::error::ValidationError| StorageError::Corrupt(e.to_string());

        Ok(LockoutRecord {
            customer_id: self.customer_id,
            identifier: self.email,
            user_type: self.user_type.parse().map_err(corrupt)?,
            website_id: self.website,
            surface,
            failed_attempts: u32::try_from(self.failed_attempts).unwrap_or(0),
            lock_type: self.lock_type.parse().map_err(corrupt)?,
            lock_until: self.lock_until.map(timestamp).transpose()?,
            first_time_lockout: self.first_time_lockout.map(timestamp).transpose()?,
            sent_email: self.sent_email,
            created_at: timestamp(self.created_at)?,
            updated_at: timestamp(self.updated_at)?,
        })
    }
}

#[async_trait]
impl LockoutRepository for SqliteLockoutRepository {
    async fn find(&self, key: &LockoutKey) -> Result<Option<LockoutRecord>, Error> {
        let table = key.surface.lockout_table();
        let row = sqlx::query_as::<_, SqliteLockoutRecord>(&format!(
            "SELECT {COLUMNS} FROM {table} WHERE email = ? AND user_type = ? AND website IS ?"
        ))
        .bind(&key.identifier)
        .bind(key.user_type.as_str())
        .bind(key.website_id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to find lockout record")?;

        row.map(|row| row.into_record(key.surface)).transpose()
    }

    async fn upsert(&self, record: &LockoutRecord) -> Result<LockoutRecord, Error> {
        let table = record.surface.lockout_table();
        const CONTEXT: &str = "Failed to upsert lockout record";

        let mut tx = self.pool.begin().await.map_db_err_with_context(CONTEXT)?;

        let existing: Option<(String, bool)> = sqlx::query_as(&format!(
            "SELECT lock_type, sent_email FROM {table} \
             WHERE email = ? AND user_type = ? AND website IS ?"
        ))
        .bind(&record.identifier)
        .bind(record.user_type.as_str())
        .bind(record.website_id)
        .fetch_optional(&mut *tx)
        .await
        .map_db_err_with_context(CONTEXT)?;

        let lock_type = record.lock_type.as_str();
        match existing {
            Some((stored_lock_type, stored_sent_email)) => {
                let sent_email = stored_sent_email && stored_lock_type == lock_type;
                sqlx::query(&format!(
                    r#"
                    UPDATE {table}
                    SET customer_id = COALESCE(?, customer_id),
                        failed_attempts = ?,
                        lock_type = ?,
                        lock_until = ?,
                        first_time_lockout = ?,
                        sent_email = ?,
                        updated_at = ?
                    WHERE email = ? AND user_type = ? AND website IS ?
                    "#
                ))
                .bind(record.customer_id)
                .bind(i64::from(record.failed_attempts))
                .bind(lock_type)
                .bind(record.lock_until.map(|dt| dt.timestamp()))
                .bind(record.first_time_lockout.map(|dt| dt.timestamp()))
                .bind(sent_email)
                .bind(record.updated_at.timestamp())
                .bind(&record.identifier)
                .bind(record.user_type.as_str())
                .bind(record.website_id)
                .execute(&mut *tx)
                .await
                .map_db_err_with_context(CONTEXT)?;
            }
            None => {
                sqlx::query(&format!(
                    "INSERT INTO {table} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)"
                ))
                .bind(record.customer_id)
                .bind(&record.identifier)
                .bind(record.user_type.as_str())
                .bind(record.website_id)
                .bind(i64::from(record.failed_attempts))
                .bind(lock_type)
                .bind(record.lock_until.map(|dt| dt.timestamp()))
                .bind(record.first_time_lockout.map(|dt| dt.timestamp()))
                .bind(record.created_at.timestamp())
                .bind(record.updated_at.timestamp())
                .execute(&mut *tx)
                .await
                .map_db_err_with_context(CONTEXT)?;
            }
        }

        let row = sqlx::query_as::<_, SqliteLockoutRecord>(&format!(
            "SELECT {COLUMNS} FROM {table} WHERE email = ? AND user_type = ? AND website IS ?"
        ))
        .bind(&record.identifier)
        .bind(record.user_type.as_str())
        .bind(record.website_id)
        .fetch_one(&mut *tx)
        .await
        .map_db_err_with_context(CONTEXT)?;

        tx.commit().await.map_db_err_with_context(CONTEXT)?;

        row.into_record(record.surface)
    }

    async fn delete(&self, key: &LockoutKey) -> Result<bool, Error> {
        let table = key.surface.lockout_table();
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE email = ? AND user_type = ? AND website IS ?"
        ))
        .bind(&key.identifier)
        .bind(key.user_type.as_str())
        .bind(key.website_id)
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to delete lockout record")?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_failed_attempts(
        &self,
        key: &LockoutKey,
        at: DateTime<Utc>,
    ) -> Result<Option<u32>, Error> {
        let table = key.surface.lockout_table();
        let count: Option<i64> = sqlx::query_scalar(&format!(
            r#"
            UPDATE {table}
            SET failed_attempts = failed_attempts + 1, updated_at = ?
            WHERE email = ? AND user_type = ? AND website IS ?
            RETURNING failed_attempts
            "#
        ))
        .bind(at.timestamp())
        .bind(&key.identifier)
        .bind(key.user_type.as_str())
        .bind(key.website_id)
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to increment failed attempts")?;

        Ok(count.map(|count| u32::try_from(count).unwrap_or(u32::MAX)))
    }

    async fn set_email_sent(&self, key: &LockoutKey, sent: bool) -> Result<(), Error> {
        let table = key.surface.lockout_table();
        sqlx::query(&format!(
            "UPDATE {table} SET sent_email = ? WHERE email = ? AND user_type = ? AND website IS ?"
        ))
        .bind(sent)
        .bind(&key.identifier)
        .bind(key.user_type.as_str())
        .bind(key.website_id)
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to update sent_email")?;

        Ok(())
    }
}
