//! Surface adapters
//!
//! An adapter turns a surface-specific request into a [`ProtectionContext`], runs the
//! engine around the host's own credential check and hands back an [`AuthOutcome`].
//! Rendering that outcome is the only thing that differs between surfaces:
//!
//! - [`interactive`] redirects with a flash message
//! - [`api`] returns a typed error carrying the remaining time and a status hint

pub mod api;
pub mod interactive;

use async_trait::async_trait;
use chrono::Duration;
use rampart_core::{
    AuthError, Credentials, LockKind, ProtectionContext, ProtectionEngine, SessionStore,
    StoreScope, Surface, UserType, Verdict,
    repositories::{ConfigRepository, LockoutRepository},
    validation::validate_identifier,
};

pub use api::ApiAuthError;
pub use interactive::InteractiveResponse;

/// The host's credential check.
///
/// Return `Err(AuthError::UpstreamAuthFailure)` when the credentials do not match;
/// any error counts as a failed attempt.
#[async_trait]
pub trait Authenticator: Send + Sync {
    type Principal: Send;

    async fn authenticate(&self, credentials: &Credentials) -> Result<Self::Principal, AuthError>;
}

/// The host's forgot-password handler.
///
/// Its response is passed through untouched, whether or not the identifier exists.
#[async_trait]
pub trait PasswordResetRequester: Send + Sync {
    type Response: Send;

    async fn request_reset(&self, identifier: &str) -> Self::Response;
}

/// Contact details of a known account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountContact {
    /// The account's id, stored on its lockout record
    pub id: Option<i64>,
    /// Where lockout emails go
    pub email: Option<String>,
}

/// The host's account lookup.
///
/// Lockout emails need a mailbox. Admin usernames rarely are one, so without a
/// directory admin lockouts are only reported to the admin inbox.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find(
        &self,
        user_type: UserType,
        identifier: &str,
        website_id: Option<i64>,
    ) -> Option<AccountContact>;
}

/// Result of a guarded attempt, before it is rendered for a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome<P> {
    Success(P),
    InvalidCredentials,
    Locked {
        kind: LockKind,
        remaining: Option<Duration>,
    },
    Delayed {
        remaining: Duration,
    },
}

impl<P> AuthOutcome<P> {
    /// Outcome of a rejected attempt. A non-blocking verdict renders as a plain
    /// credential failure.
    pub fn rejected(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Proceed => AuthOutcome::InvalidCredentials,
            Verdict::Delay { remaining } => AuthOutcome::Delayed { remaining },
            Verdict::TemporaryLock { remaining } => AuthOutcome::Locked {
                kind: LockKind::Temporary,
                remaining: Some(remaining),
            },
            Verdict::PermanentLock => AuthOutcome::Locked {
                kind: LockKind::Permanent,
                remaining: None,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<P, AuthError> {
        match self {
            AuthOutcome::Success(principal) => Ok(principal),
            AuthOutcome::InvalidCredentials => Err(AuthError::InvalidCredentialsInput),
            AuthOutcome::Locked { kind, remaining } => {
                Err(AuthError::AccountLocked { kind, remaining })
            }
            AuthOutcome::Delayed { remaining } => Err(AuthError::AccountDelayed {
                remaining_seconds: remaining.num_seconds().max(1),
            }),
        }
    }
}

/// Where an attempt comes from.
#[derive(Clone, Copy)]
pub struct Attempt<'a> {
    pub user_type: UserType,
    pub scope: StoreScope,
    pub session: &'a dyn SessionStore,
    pub recipient: Option<&'a str>,
    pub account_id: Option<i64>,
}

impl<'a> Attempt<'a> {
    pub fn customer(scope: StoreScope, session: &'a dyn SessionStore) -> Self {
        Self {
            user_type: UserType::Customer,
            scope,
            session,
            recipient: None,
            account_id: None,
        }
    }

    /// Admin attempts are never scoped to a website.
    pub fn admin(session: &'a dyn SessionStore) -> Self {
        Self {
            user_type: UserType::Admin,
            scope: StoreScope::global(),
            session,
            recipient: None,
            account_id: None,
        }
    }

    pub fn with_recipient(mut self, recipient: &'a str) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn with_account_id(mut self, id: i64) -> Self {
        self.account_id = Some(id);
        self
    }

    /// Take the recipient and account id from a directory entry.
    pub fn with_contact(mut self, contact: Option<&'a AccountContact>) -> Self {
        if let Some(contact) = contact {
            self.recipient = contact.email.as_deref().or(self.recipient);
            self.account_id = contact.id.or(self.account_id);
        }
        self
    }

    fn context<'b>(&self, identifier: &'b str, surface: Surface) -> ProtectionContext<'b>
    where
        'a: 'b,
    {
        let mut ctx = ProtectionContext::new(identifier, self.user_type, surface, self.session)
            .with_scope(self.scope);
        if let Some(recipient) = self.recipient {
            ctx = ctx.with_recipient(recipient);
        }
        if let Some(id) = self.account_id {
            ctx = ctx.with_customer_id(id);
        }
        ctx
    }
}

/// Run a login attempt through the engine.
pub async fn guard_login<L, C, A>(
    engine: &ProtectionEngine<L, C>,
    attempt: Attempt<'_>,
    authenticator: &A,
    credentials: &Credentials,
) -> AuthOutcome<A::Principal>
where
    L: LockoutRepository,
    C: ConfigRepository,
    A: Authenticator + ?Sized,
{
    if credentials.validate().is_err() {
        return AuthOutcome::InvalidCredentials;
    }

    let ctx = attempt.context(credentials.identifier(), Surface::Login);

    let verdict = engine.check(&ctx).await;
    if verdict.is_blocking() {
        return AuthOutcome::rejected(verdict);
    }

    match authenticator.authenticate(credentials).await {
        Ok(principal) => {
            engine.record_success(&ctx).await;
            AuthOutcome::Success(principal)
        }
        Err(e) => {
            tracing::debug!(error = %e, user_type = %attempt.user_type, "Credential check failed");
            AuthOutcome::rejected(engine.record_failure(&ctx).await)
        }
    }
}

/// Run a forgot-password submission through the engine.
///
/// A reset request carries no secret, so every submission that gets past the
/// pre-check is counted. Escalation applies from the next submission.
pub async fn guard_reset<L, C, Q>(
    engine: &ProtectionEngine<L, C>,
    attempt: Attempt<'_>,
    requester: &Q,
    identifier: &str,
) -> AuthOutcome<Q::Response>
where
    L: LockoutRepository,
    C: ConfigRepository,
    Q: PasswordResetRequester + ?Sized,
{
    let Ok(identifier) = validate_identifier(identifier) else {
        return AuthOutcome::InvalidCredentials;
    };

    let ctx = attempt.context(identifier, Surface::ForgotPassword);

    let verdict = engine.check(&ctx).await;
    if verdict.is_blocking() {
        return AuthOutcome::rejected(verdict);
    }

    let response = requester.request_reset(identifier).await;

    let next = engine.record_failure(&ctx).await;
    if next.is_blocking() {
        tracing::debug!(
            user_type = %attempt.user_type,
            verdict = ?next,
            "Forgot-password submissions restricted from the next request"
        );
    }

    AuthOutcome::Success(response)
}
