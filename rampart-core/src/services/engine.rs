//! The attempt-tracking, delay and lockout state machine.
//!
//! Every protected surface goes through the same three calls:
//!
//! 1. [`ProtectionEngine::check`] before verifying credentials, to short-circuit
//!    identifiers that are locked or inside a delay window
//! 2. [`ProtectionEngine::record_failure`] after a failed verification, to count the
//!    attempt and possibly escalate
//! 3. [`ProtectionEngine::record_success`] after a successful verification, to clear
//!    all state for the identifier
//!
//! # Escalation
//!
//! Failed attempts are cumulative until a success. With a delay threshold `D` and a
//! lock threshold `L`, the `n`-th failure is placed at position `p = ((n - 1) mod L) + 1`
//! of the current lock cycle. Position `L` applies a temporary lock, positions
//! `D..L` arm a delay cooldown. Admin login additionally has a permanent threshold,
//! evaluated first.
//!
//! # Failure policy
//!
//! Storage, sealing and configuration errors never block an attempt. The public
//! methods log them and return [`Verdict::Proceed`]; only genuine delay and lock
//! verdicts fail closed.
//!
//! # Example
//!
//! ```rust,ignore
//! use rampart_core::{ProtectionContext, MemorySessionStore, UserType, Surface};
//!
//! let session = MemorySessionStore::new();
//! let ctx = ProtectionContext::new("alice@example.com", UserType::Customer, Surface::Login, &session);
//!
//! if engine.check(&ctx).await.is_blocking() {
//!     // render the verdict
//! }
//! match verify(credentials).await {
//!     Ok(user) => engine.record_success(&ctx).await,
//!     Err(_) => { let verdict = engine.record_failure(&ctx).await; }
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    Error,
    config::{ConfigResolver, DelayPolicy, LockPolicy, ProtectionSettings, StoreScope},
    error::AuthError,
    repositories::{ConfigRepository, LockoutRepository},
    services::{
        notifier::{AdminNotifier, LockoutNotice, LogNotifier, Mailer, NotificationService},
        quota::{QuotaCategory, RestrictionKind, RestrictionQuota},
        sealed::SealedConfig,
        throttle::NotificationThrottle,
    },
    session::{AttemptCounter, DelayTimer, QuotaFlags, SessionKeys, SessionStore},
    storage::{LockKind, LockType, LockoutKey, LockoutRecord, Surface, UserType},
};

/// The engine's decision for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Delay { remaining: Duration },
    TemporaryLock { remaining: Duration },
    PermanentLock,
}

impl Verdict {
    /// True for every verdict other than [`Verdict::Proceed`].
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Verdict::Proceed)
    }

    /// The user-facing error for a blocking verdict.
    pub fn into_error(self) -> Option<AuthError> {
        match self {
            Verdict::Proceed => None,
            Verdict::Delay { remaining } => Some(AuthError::AccountDelayed {
                remaining_seconds: remaining.num_seconds().max(1),
            }),
            Verdict::TemporaryLock { remaining } => Some(AuthError::AccountLocked {
                kind: LockKind::Temporary,
                remaining: Some(remaining),
            }),
            Verdict::PermanentLock => Some(AuthError::AccountLocked {
                kind: LockKind::Permanent,
                remaining: None,
            }),
        }
    }
}

/// Everything the engine needs to know about one attempt.
pub struct ProtectionContext<'a> {
    pub identifier: &'a str,
    pub user_type: UserType,
    pub surface: Surface,
    pub scope: StoreScope,
    pub now: DateTime<Utc>,
    pub session: &'a dyn SessionStore,
    /// Mailbox for the lockout email when the identifier is not one.
    pub recipient: Option<&'a str>,
    pub customer_id: Option<i64>,
}

impl<'a> ProtectionContext<'a> {
    pub fn new(
        identifier: &'a str,
        user_type: UserType,
        surface: Surface,
        session: &'a dyn SessionStore,
    ) -> Self {
        Self {
            identifier,
            user_type,
            surface,
            scope: StoreScope::global(),
            now: Utc::now(),
            session,
            recipient: None,
            customer_id: None,
        }
    }

    pub fn with_scope(mut self, scope: StoreScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_recipient(mut self, recipient: &'a str) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn with_customer_id(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Website the attempt is keyed under; always `None` for admins.
    pub fn website_id(&self) -> Option<i64> {
        match self.user_type {
            UserType::Admin => None,
            UserType::Customer => self.scope.website_id,
        }
    }

    pub fn lockout_key(&self) -> LockoutKey {
        LockoutKey::new(self.identifier, self.user_type, self.website_id(), self.surface)
    }

    pub fn session_keys(&self) -> SessionKeys {
        SessionKeys::new(self.identifier, self.user_type, self.surface, self.website_id())
    }

    fn category(&self, kind: RestrictionKind) -> QuotaCategory {
        QuotaCategory::new(self.user_type, self.surface, kind)
    }
}

/// Per-attempt session handles.
struct SessionState<'a> {
    counter: AttemptCounter<'a>,
    timer: DelayTimer<'a>,
    flags: QuotaFlags<'a>,
}

impl<'a> SessionState<'a> {
    fn new(ctx: &ProtectionContext<'a>) -> Self {
        let keys = ctx.session_keys();
        Self {
            counter: AttemptCounter::new(ctx.session, &keys),
            timer: DelayTimer::new(ctx.session, &keys),
            flags: QuotaFlags::new(ctx.session, &keys),
        }
    }
}

/// Orchestrates settings, session counters, the durable lockout store, restriction
/// quotas and notifications into a [`Verdict`].
pub struct ProtectionEngine<L: LockoutRepository, C: ConfigRepository> {
    lockouts: Arc<L>,
    resolver: ConfigResolver<C>,
    sealed: Arc<SealedConfig<C>>,
    quota: RestrictionQuota<C>,
    notifications: NotificationService<C>,
}

impl<L: LockoutRepository, C: ConfigRepository> ProtectionEngine<L, C> {
    /// Create an engine that logs notifications instead of delivering them.
    ///
    /// # Arguments
    ///
    /// * `lockouts` - The durable lockout store
    /// * `config` - The scoped config store holding settings and sealed blobs
    pub fn new(lockouts: Arc<L>, config: Arc<C>) -> Self {
        let sealed = Arc::new(SealedConfig::new(config.clone()));
        let notifier = Arc::new(LogNotifier);

        Self {
            lockouts,
            resolver: ConfigResolver::new(config),
            quota: RestrictionQuota::new(sealed.clone()),
            notifications: NotificationService::new(
                notifier.clone(),
                notifier,
                NotificationThrottle::new(sealed.clone()),
            ),
            sealed,
        }
    }

    /// Deliver notifications through the host's collaborators.
    pub fn with_notifiers(
        mut self,
        mailer: Arc<dyn Mailer>,
        admin_notifier: Arc<dyn AdminNotifier>,
    ) -> Self {
        self.notifications = NotificationService::new(
            mailer,
            admin_notifier,
            NotificationThrottle::new(self.sealed.clone()),
        );
        self
    }

    pub fn resolver(&self) -> &ConfigResolver<C> {
        &self.resolver
    }

    pub fn quota(&self) -> &RestrictionQuota<C> {
        &self.quota
    }

    pub fn throttle(&self) -> &NotificationThrottle<C> {
        self.notifications.throttle()
    }

    /// Pre-check an attempt before credentials are verified.
    pub async fn check(&self, ctx: &ProtectionContext<'_>) -> Verdict {
        match self.try_check(ctx).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_type = %ctx.user_type,
                    surface = %ctx.surface,
                    "Protection pre-check failed, allowing attempt"
                );
                Verdict::Proceed
            }
        }
    }

    /// Count a failed verification and escalate if a threshold is reached.
    pub async fn record_failure(&self, ctx: &ProtectionContext<'_>) -> Verdict {
        match self.try_record_failure(ctx).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_type = %ctx.user_type,
                    surface = %ctx.surface,
                    "Failed to record failed attempt, allowing attempt"
                );
                Verdict::Proceed
            }
        }
    }

    /// Clear all state after a verified success.
    pub async fn record_success(&self, ctx: &ProtectionContext<'_>) {
        if let Err(e) = self.try_record_success(ctx).await {
            tracing::error!(
                error = %e,
                user_type = %ctx.user_type,
                surface = %ctx.surface,
                "Failed to clear protection state after success"
            );
        }
    }

    /// Read the durable record for a key.
    pub async fn lockout_status(&self, key: &LockoutKey) -> Result<Option<LockoutRecord>, Error> {
        self.lockouts.find(key).await
    }

    /// Delete the durable record for a key. This is the only way out of a
    /// permanent lock.
    ///
    /// # Returns
    ///
    /// `true` if a record was deleted.
    pub async fn unlock(&self, key: &LockoutKey) -> Result<bool, Error> {
        let deleted = self.lockouts.delete(key).await?;
        if deleted {
            tracing::info!(user_type = %key.user_type, surface = %key.surface, "Account unlocked");
        }
        Ok(deleted)
    }

    async fn try_check(&self, ctx: &ProtectionContext<'_>) -> Result<Verdict, Error> {
        let settings = self
            .resolver
            .settings(ctx.user_type, ctx.surface, ctx.scope)
            .await?;
        let key = ctx.lockout_key();
        let record = self.lockouts.find(&key).await?;

        if record.as_ref().is_some_and(LockoutRecord::is_permanently_locked) {
            return Ok(Verdict::PermanentLock);
        }
        if settings.is_disabled() {
            return Ok(Verdict::Proceed);
        }

        let state = SessionState::new(ctx);
        if let Some(record) = record {
            if let Some(verdict) = self.expire_or_block(ctx, record, &state).await?.1 {
                return Ok(verdict);
            }
        }

        if let Some(until) = state.timer.armed_until().await? {
            if ctx.now < until {
                return Ok(Verdict::Delay {
                    remaining: until - ctx.now,
                });
            }
            state.timer.release().await?;
        }

        Ok(Verdict::Proceed)
    }

    /// Returns the record as it stands after lazy expiry, plus a verdict if the
    /// record still blocks the attempt.
    async fn expire_or_block(
        &self,
        ctx: &ProtectionContext<'_>,
        mut record: LockoutRecord,
        state: &SessionState<'_>,
    ) -> Result<(LockoutRecord, Option<Verdict>), Error> {
        match record.lock_type {
            LockType::Permanent => Ok((record, Some(Verdict::PermanentLock))),
            LockType::Temporary => {
                if let Some(until) = record.lock_until.filter(|until| ctx.now < *until) {
                    let verdict = Verdict::TemporaryLock {
                        remaining: until - ctx.now,
                    };
                    return Ok((record, Some(verdict)));
                }

                state.counter.set(record.failed_attempts).await?;
                record.lock_type = LockType::None;
                record.lock_until = None;
                record.updated_at = ctx.now;
                let record = self.lockouts.upsert(&record).await?;

                tracing::info!(
                    user_type = %ctx.user_type,
                    surface = %ctx.surface,
                    failed_attempts = record.failed_attempts,
                    "Temporary lock expired"
                );
                Ok((record, None))
            }
            LockType::None => Ok((record, None)),
        }
    }

    async fn try_record_failure(&self, ctx: &ProtectionContext<'_>) -> Result<Verdict, Error> {
        let settings = self
            .resolver
            .settings(ctx.user_type, ctx.surface, ctx.scope)
            .await?;
        if settings.is_disabled() {
            return Ok(Verdict::Proceed);
        }

        let key = ctx.lockout_key();
        let state = SessionState::new(ctx);

        let existing = match self.lockouts.find(&key).await? {
            Some(record) => {
                let (record, verdict) = self.expire_or_block(ctx, record, &state).await?;
                if let Some(verdict) = verdict {
                    return Ok(verdict);
                }
                Some(record)
            }
            None => None,
        };

        let session_count = state.counter.increment().await?;
        let durable_count = match existing {
            Some(_) => self
                .lockouts
                .increment_failed_attempts(&key, ctx.now)
                .await?
                .unwrap_or(0),
            None => 0,
        };
        let attempts = session_count.max(durable_count);
        if attempts != session_count {
            state.counter.set(attempts).await?;
        }

        tracing::debug!(
            user_type = %ctx.user_type,
            surface = %ctx.surface,
            attempts,
            "Counted failed attempt"
        );

        if settings
            .permanent_attempts
            .is_some_and(|threshold| attempts >= threshold)
        {
            return self
                .apply_permanent_lock(ctx, &settings, &key, existing, attempts, &state)
                .await;
        }

        let mut lock = if state.flags.lock_limit_exceeded().await? {
            None
        } else {
            settings.lockout
        };

        if let Some(policy) = lock {
            if settings.cycle_position(attempts, true) == policy.attempts {
                let category = ctx.category(RestrictionKind::Lock);
                if self.quota.try_admit(ctx.identifier, category).await? {
                    return self
                        .apply_temporary_lock(ctx, &settings, policy, &key, existing, attempts, &state)
                        .await;
                }
                state.flags.mark_lock_limit_exceeded().await?;
                lock = None;
            }
        }

        let Some(delay) = settings.delay else {
            return Ok(Verdict::Proceed);
        };
        if state.flags.delay_limit_exceeded().await? {
            return Ok(Verdict::Proceed);
        }

        let position = settings.cycle_position(attempts, lock.is_some());
        let below_lock = lock.is_none_or(|policy| position < policy.attempts);
        if position >= delay.attempts && below_lock {
            return self
                .apply_delay(ctx, delay, &key, existing, attempts, &state)
                .await;
        }

        Ok(Verdict::Proceed)
    }

    async fn apply_delay(
        &self,
        ctx: &ProtectionContext<'_>,
        delay: DelayPolicy,
        key: &LockoutKey,
        existing: Option<LockoutRecord>,
        attempts: u32,
        state: &SessionState<'_>,
    ) -> Result<Verdict, Error> {
        if state.timer.take_allow_once().await? {
            tracing::debug!(
                user_type = %ctx.user_type,
                surface = %ctx.surface,
                "Boundary attempt after delay, not re-arming"
            );
            return Ok(Verdict::Proceed);
        }

        if let Some(until) = state.timer.armed_until().await? {
            if ctx.now < until {
                return Ok(Verdict::Delay {
                    remaining: until - ctx.now,
                });
            }
        }

        let category = ctx.category(RestrictionKind::Delay);
        if !self.quota.try_admit(ctx.identifier, category).await? {
            state.flags.mark_delay_limit_exceeded().await?;
            return Ok(Verdict::Proceed);
        }

        state.timer.arm(ctx.now + delay.duration).await?;

        let mut record = existing.unwrap_or_else(|| LockoutRecord::new(key, ctx.now));
        record.customer_id = ctx.customer_id.or(record.customer_id);
        record.failed_attempts = attempts;
        record.lock_type = LockType::None;
        record.lock_until = None;
        record.updated_at = ctx.now;
        self.lockouts.upsert(&record).await?;

        Ok(Verdict::Delay {
            remaining: delay.duration,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_temporary_lock(
        &self,
        ctx: &ProtectionContext<'_>,
        settings: &ProtectionSettings,
        policy: LockPolicy,
        key: &LockoutKey,
        existing: Option<LockoutRecord>,
        attempts: u32,
        state: &SessionState<'_>,
    ) -> Result<Verdict, Error> {
        let lock_until = ctx.now + policy.duration;

        let mut record = existing.unwrap_or_else(|| LockoutRecord::new(key, ctx.now));
        record.customer_id = ctx.customer_id.or(record.customer_id);
        record.failed_attempts = attempts;
        record.lock_type = LockType::Temporary;
        record.lock_until = Some(lock_until);
        record.first_time_lockout = Some(ctx.now);
        record.updated_at = ctx.now;
        let stored = self.lockouts.upsert(&record).await?;

        state.counter.reset().await?;
        state.timer.clear().await?;

        tracing::info!(
            user_type = %ctx.user_type,
            surface = %ctx.surface,
            failed_attempts = attempts,
            lock_until = %lock_until,
            "Temporary lock applied"
        );

        self.notify_once(ctx, settings, &stored, LockKind::Temporary)
            .await;

        Ok(Verdict::TemporaryLock {
            remaining: policy.duration,
        })
    }

    async fn apply_permanent_lock(
        &self,
        ctx: &ProtectionContext<'_>,
        settings: &ProtectionSettings,
        key: &LockoutKey,
        existing: Option<LockoutRecord>,
        attempts: u32,
        state: &SessionState<'_>,
    ) -> Result<Verdict, Error> {
        let mut record = existing.unwrap_or_else(|| LockoutRecord::new(key, ctx.now));
        record.customer_id = ctx.customer_id.or(record.customer_id);
        record.failed_attempts = attempts;
        record.lock_type = LockType::Permanent;
        record.lock_until = None;
        record.updated_at = ctx.now;
        let stored = self.lockouts.upsert(&record).await?;

        state.counter.reset().await?;
        state.timer.clear().await?;

        tracing::info!(
            user_type = %ctx.user_type,
            surface = %ctx.surface,
            failed_attempts = attempts,
            "Permanent lock applied"
        );

        self.notify_once(ctx, settings, &stored, LockKind::Permanent)
            .await;

        Ok(Verdict::PermanentLock)
    }

    /// Notify at most once per lockout episode. Failures never undo the lock.
    async fn notify_once(
        &self,
        ctx: &ProtectionContext<'_>,
        settings: &ProtectionSettings,
        record: &LockoutRecord,
        kind: LockKind,
    ) {
        if record.sent_email {
            tracing::debug!(user_type = %ctx.user_type, "Lockout already notified");
            return;
        }

        let notice = LockoutNotice {
            identifier: &record.identifier,
            user_type: ctx.user_type,
            surface: ctx.surface,
            kind,
            lock_until: record.lock_until,
            recipient: ctx.recipient,
            email_template: &settings.email_template,
            notify_admin: settings.notify_admin,
            notify_email: settings.notify_email,
        };
        self.notifications.notify_lockout(&notice).await;
        if let Err(e) = self.lockouts.mark_email_sent(&record.key()).await {
            tracing::error!(
                error = %e,
                user_type = %ctx.user_type,
                surface = %ctx.surface,
                "Failed to flag lockout notification as sent"
            );
        }
    }

    async fn try_record_success(&self, ctx: &ProtectionContext<'_>) -> Result<(), Error> {
        let state = SessionState::new(ctx);
        state.counter.reset().await?;
        state.timer.clear().await?;
        state.flags.clear().await?;

        let key = ctx.lockout_key();
        match self.lockouts.find(&key).await? {
            Some(record) if record.is_permanently_locked() => {
                tracing::warn!(
                    user_type = %ctx.user_type,
                    surface = %ctx.surface,
                    "Success reported for a permanently locked account, keeping the lock"
                );
            }
            Some(_) => {
                self.lockouts.delete(&key).await?;
            }
            None => {}
        }

        Ok(())
    }
}
