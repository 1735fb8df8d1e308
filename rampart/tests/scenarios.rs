//! End-to-end protection scenarios against SQLite storage

#![cfg(feature = "sqlite")]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rampart::{
    AccountContact, AccountDirectory, ApiAuthError, AuthError, Authenticator, ConfigScope, Credentials, InteractiveResponse,
    LockType, LockoutKey, MemorySessionStore, PasswordResetRequester, QuotaCategory, Rampart,
    RampartBuilder, RestrictionKind, SqliteRepositoryProvider, StoreScope, Surface, UserType,
    Verdict, messages,
};
use rampart_core::{Mailer, ProtectionContext, error::NotificationError};

const PASSWORD: &str = "correct horse battery staple";

/// Accepts a single password and counts how often it was asked.
#[derive(Default)]
struct StaticAuthenticator {
    calls: AtomicUsize,
}

impl StaticAuthenticator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    type Principal = String;

    async fn authenticate(&self, credentials: &Credentials) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if credentials.password == PASSWORD {
            Ok(credentials.identifier().to_string())
        } else {
            Err(AuthError::UpstreamAuthFailure)
        }
    }
}

#[derive(Default)]
struct CountingRequester {
    calls: AtomicUsize,
}

#[async_trait]
impl PasswordResetRequester for CountingRequester {
    type Response = &'static str;

    async fn request_reset(&self, _identifier: &str) -> &'static str {
        self.calls.fetch_add(1, Ordering::SeqCst);
        "If an account exists, a reset link has been sent."
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: std::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email(
        &self,
        template: &str,
        recipient: &str,
        _vars: &HashMap<String, String>,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .unwrap()
            .push((template.to_string(), recipient.to_string()));
        Ok(())
    }
}

/// Knows a single admin account.
struct AdminDirectory;

#[async_trait]
impl AccountDirectory for AdminDirectory {
    async fn find(
        &self,
        user_type: UserType,
        identifier: &str,
        _website_id: Option<i64>,
    ) -> Option<AccountContact> {
        (user_type == UserType::Admin && identifier == "root").then(|| AccountContact {
            id: Some(1),
            email: Some("ops@example.com".to_string()),
        })
    }
}

async fn rampart() -> Rampart<SqliteRepositoryProvider> {
    RampartBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .expect("Failed to connect to SQLite")
        .apply_migrations(true)
        .build()
        .await
        .expect("Failed to build Rampart")
}

fn wrong(username: &str) -> Credentials {
    Credentials::new(username, "wrong")
}

fn customer_key(identifier: &str, website: i64, surface: Surface) -> LockoutKey {
    LockoutKey::new(identifier, UserType::Customer, Some(website), surface)
}

#[tokio::test]
async fn test_delay_then_temporary_lock() {
    let rampart = rampart().await;
    let session = MemorySessionStore::new();
    let now = Utc::now();
    let ctx = ProtectionContext::new(
        "alice@example.com",
        UserType::Customer,
        Surface::Login,
        &session,
    )
    .with_scope(StoreScope::website(1))
    .at(now);

    let mut verdicts = Vec::new();
    for _ in 0..4 {
        verdicts.push(rampart.engine().record_failure(&ctx).await);
    }
    assert_eq!(verdicts[0], Verdict::Proceed);
    assert_eq!(verdicts[1], Verdict::Proceed);
    assert_eq!(
        verdicts[2],
        Verdict::Delay {
            remaining: Duration::seconds(30)
        }
    );
    assert!(matches!(verdicts[3], Verdict::Delay { .. }));

    assert_eq!(
        rampart.engine().record_failure(&ctx).await,
        Verdict::TemporaryLock {
            remaining: Duration::minutes(30)
        }
    );

    let record = rampart
        .lockout_status(&customer_key("alice@example.com", 1, Surface::Login))
        .await
        .unwrap()
        .expect("lockout record");
    assert_eq!(record.lock_type, LockType::Temporary);
    assert_eq!(record.failed_attempts, 5);
    assert_eq!(
        record.lock_until.map(|t| t.timestamp()),
        Some((now + Duration::minutes(30)).timestamp())
    );
}

#[tokio::test]
async fn test_all_thresholds_disabled_never_writes() {
    let rampart = RampartBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .apply_migrations(true)
        .with_setting("rampart/customer_login/delay_attempts", "0", ConfigScope::Default)
        .with_setting("rampart/customer_login/lockout_attempts", "0", ConfigScope::Default)
        .build()
        .await
        .unwrap();
    let authenticator = StaticAuthenticator::default();
    let session = MemorySessionStore::new();

    for _ in 0..12 {
        let response = rampart
            .customer_login(
                &authenticator,
                &wrong("alice@example.com"),
                StoreScope::website(1),
                &session,
            )
            .await;
        assert_eq!(response.flash(), Some(messages::INVALID_CREDENTIALS));
    }

    assert_eq!(authenticator.calls(), 12);
    assert!(session.is_empty());
    assert!(
        rampart
            .lockout_status(&customer_key("alice@example.com", 1, Surface::Login))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_delay_quota_exhausted_for_new_identifier() {
    let rampart = RampartBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .apply_migrations(true)
        .with_quota_limit(
            QuotaCategory::new(UserType::Customer, Surface::Login, RestrictionKind::Delay),
            Some(1),
        )
        .build()
        .await
        .unwrap();
    let authenticator = StaticAuthenticator::default();
    let scope = StoreScope::website(1);

    let alice = MemorySessionStore::new();
    let mut last = None;
    for _ in 0..3 {
        last = Some(
            rampart
                .customer_login(&authenticator, &wrong("alice@example.com"), scope, &alice)
                .await,
        );
    }
    let last = last.unwrap();
    assert!(last.flash().unwrap().contains("30 seconds"));

    let bob = MemorySessionStore::new();
    for _ in 0..4 {
        let response = rampart
            .customer_login(&authenticator, &wrong("bob@example.com"), scope, &bob)
            .await;
        assert_eq!(response.flash(), Some(messages::INVALID_CREDENTIALS));
    }

    let category = QuotaCategory::new(UserType::Customer, Surface::Login, RestrictionKind::Delay);
    assert_eq!(category.name(), "customer_delay");
    assert_eq!(
        rampart.engine().quota().member_count(category).await.unwrap(),
        1
    );
    assert!(
        rampart
            .engine()
            .quota()
            .is_member("alice@example.com", category)
            .await
            .unwrap()
    );

    // Alice keeps being delayed
    let response = rampart
        .customer_login(&authenticator, &wrong("alice@example.com"), scope, &alice)
        .await;
    assert!(response.flash().unwrap().starts_with("Too many failed attempts"));
}

#[tokio::test]
async fn test_admin_escalates_to_permanent_lock() {
    let rampart = RampartBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .apply_migrations(true)
        .with_setting("rampart/admin_login/permanent_attempts", "7", ConfigScope::Default)
        .build()
        .await
        .unwrap();
    let session = MemorySessionStore::new();
    let key = LockoutKey::new("root", UserType::Admin, None, Surface::Login);
    let t0 = Utc::now() - Duration::hours(2);
    let admin = |now| {
        ProtectionContext::new("root", UserType::Admin, Surface::Login, &session)
            .with_scope(StoreScope::website(3))
            .at(now)
    };

    for _ in 0..4 {
        rampart.engine().record_failure(&admin(t0)).await;
    }
    assert!(matches!(
        rampart.engine().record_failure(&admin(t0)).await,
        Verdict::TemporaryLock { .. }
    ));
    let record = rampart.lockout_status(&key).await.unwrap().unwrap();
    assert_eq!(record.lock_type, LockType::Temporary);
    assert_eq!(record.website_id, None);

    let t1 = t0 + Duration::minutes(31);
    assert_eq!(rampart.engine().record_failure(&admin(t1)).await, Verdict::Proceed);
    let record = rampart.lockout_status(&key).await.unwrap().unwrap();
    assert_eq!(record.lock_type, LockType::None);
    assert_eq!(record.failed_attempts, 6);

    assert_eq!(
        rampart.engine().record_failure(&admin(t1)).await,
        Verdict::PermanentLock
    );
    let record = rampart.lockout_status(&key).await.unwrap().unwrap();
    assert_eq!(record.lock_type, LockType::Permanent);

    // Neither time nor the right password lifts it
    assert_eq!(
        rampart
            .engine()
            .check(&admin(t1 + Duration::days(30)))
            .await,
        Verdict::PermanentLock
    );
    let authenticator = StaticAuthenticator::default();
    let response = rampart
        .admin_login(&authenticator, &Credentials::new("root", PASSWORD), &session)
        .await;
    assert_eq!(
        response,
        InteractiveResponse::Redirect {
            location: "admin".to_string(),
            flash: messages::PERMANENTLY_LOCKED.to_string(),
        }
    );
    assert_eq!(authenticator.calls(), 0);

    let err = rampart
        .admin_token(&authenticator, &Credentials::new("root", PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 403);

    assert!(rampart.unlock_account(&key).await.unwrap());
    let response = rampart
        .admin_login(&authenticator, &Credentials::new("root", PASSWORD), &session)
        .await;
    assert_eq!(response, InteractiveResponse::Completed("root".to_string()));
}

#[tokio::test]
async fn test_interactive_lock_notifies_once() {
    let mailer = Arc::new(RecordingMailer::default());
    let rampart = RampartBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .apply_migrations(true)
        .with_mailer(mailer.clone())
        .with_setting("rampart/customer_login/delay_attempts", "0", ConfigScope::Default)
        .build()
        .await
        .unwrap();
    let authenticator = StaticAuthenticator::default();
    let session = MemorySessionStore::new();
    let scope = StoreScope::store(1, 10);

    for _ in 0..4 {
        let response = rampart
            .customer_login(&authenticator, &wrong("Alice@Example.com "), scope, &session)
            .await;
        assert_eq!(response.flash(), Some(messages::INVALID_CREDENTIALS));
    }

    let response = rampart
        .customer_login(&authenticator, &wrong("alice@example.com"), scope, &session)
        .await;
    assert_eq!(
        response.flash(),
        Some("This account is temporarily locked. Please try again in 30 minutes.")
    );
    assert_eq!(authenticator.calls(), 5);

    // The correct password does not get through while locked
    let response = rampart
        .customer_login(
            &authenticator,
            &Credentials::new("alice@example.com", PASSWORD),
            scope,
            &session,
        )
        .await;
    assert!(response.is_redirect());
    assert_eq!(authenticator.calls(), 5);

    assert_eq!(
        mailer.sent(),
        vec![(
            "rampart_customer_login_lockout".to_string(),
            "alice@example.com".to_string()
        )]
    );
    let record = rampart
        .lockout_status(&customer_key("alice@example.com", 1, Surface::Login))
        .await
        .unwrap()
        .unwrap();
    assert!(record.sent_email);
}

#[tokio::test]
async fn test_admin_lock_emails_directory_address() {
    let mailer = Arc::new(RecordingMailer::default());
    let rampart = RampartBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .apply_migrations(true)
        .with_mailer(mailer.clone())
        .with_account_directory(Arc::new(AdminDirectory))
        .with_setting("rampart/admin_login/delay_attempts", "0", ConfigScope::Default)
        .build()
        .await
        .unwrap();
    let authenticator = StaticAuthenticator::default();
    let session = MemorySessionStore::new();

    let mut response = None;
    for _ in 0..5 {
        response = Some(rampart.admin_login(&authenticator, &wrong("root"), &session).await);
    }
    assert_eq!(
        response.unwrap().flash(),
        Some("This account is temporarily locked. Please try again in 30 minutes.")
    );

    // Locked attempts do not notify again
    rampart.admin_login(&authenticator, &wrong("root"), &session).await;

    assert_eq!(
        mailer.sent(),
        vec![(
            "rampart_admin_login_lockout".to_string(),
            "ops@example.com".to_string()
        )]
    );
    let record = rampart
        .lockout_status(&LockoutKey::new("root", UserType::Admin, None, Surface::Login))
        .await
        .unwrap()
        .unwrap();
    assert!(record.sent_email);
    assert_eq!(record.customer_id, Some(1));
}

#[tokio::test]
async fn test_admin_lock_without_directory_sends_no_email() {
    let mailer = Arc::new(RecordingMailer::default());
    let rampart = RampartBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .apply_migrations(true)
        .with_mailer(mailer.clone())
        .with_setting("rampart/admin_login/delay_attempts", "0", ConfigScope::Default)
        .build()
        .await
        .unwrap();
    let authenticator = StaticAuthenticator::default();

    for _ in 0..5 {
        let _ = rampart.admin_token(&authenticator, &wrong("root")).await;
    }

    assert!(mailer.sent().is_empty());
    let record = rampart
        .lockout_status(&LockoutKey::new("root", UserType::Admin, None, Surface::Login))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.lock_type, LockType::Temporary);
    assert_eq!(record.customer_id, None);
}

#[tokio::test]
async fn test_token_success_clears_state() {
    let rampart = rampart().await;
    let authenticator = StaticAuthenticator::default();
    let scope = StoreScope::website(1);
    let key = customer_key("alice@example.com", 1, Surface::Login);

    // Failures an hour ago left a record and an elapsed delay behind
    let earlier = Utc::now() - Duration::hours(1);
    let ctx = ProtectionContext::new(
        "alice@example.com",
        UserType::Customer,
        Surface::Login,
        rampart.api_session(),
    )
    .with_scope(scope)
    .at(earlier);
    for _ in 0..3 {
        rampart.engine().record_failure(&ctx).await;
    }
    assert!(rampart.lockout_status(&key).await.unwrap().is_some());

    let principal = rampart
        .customer_token(
            &authenticator,
            &Credentials::new("alice@example.com", PASSWORD),
            scope,
        )
        .await
        .unwrap();
    assert_eq!(principal, "alice@example.com");

    assert!(rampart.lockout_status(&key).await.unwrap().is_none());
    assert_eq!(
        rampart
            .engine()
            .check(
                &ProtectionContext::new(
                    "alice@example.com",
                    UserType::Customer,
                    Surface::Login,
                    rampart.api_session(),
                )
                .with_scope(scope)
            )
            .await,
        Verdict::Proceed
    );
}

#[tokio::test]
async fn test_forgot_password_counts_every_submission() {
    let rampart = rampart().await;
    let requester = CountingRequester::default();
    let scope = StoreScope::website(1);

    for _ in 0..3 {
        let response = rampart
            .customer_forgot_password_api(&requester, "alice@example.com", scope)
            .await
            .unwrap();
        assert_eq!(response, "If an account exists, a reset link has been sent.");
    }

    let err = rampart
        .customer_forgot_password_api(&requester, "alice@example.com", scope)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiAuthError::Delayed { .. }));
    assert_eq!(err.status(), 429);
    assert_eq!(requester.calls.load(Ordering::SeqCst), 3);

    let record = rampart
        .lockout_status(&customer_key("alice@example.com", 1, Surface::ForgotPassword))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.failed_attempts, 3);
    assert!(
        rampart
            .lockout_status(&customer_key("alice@example.com", 1, Surface::Login))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_forgot_password_interactive_redirects_while_delayed() {
    let rampart = rampart().await;
    let requester = CountingRequester::default();
    let session = MemorySessionStore::new();

    for _ in 0..3 {
        let response = rampart
            .admin_forgot_password(&requester, "root", &session)
            .await;
        assert!(!response.is_redirect());
    }

    match rampart.admin_forgot_password(&requester, "root", &session).await {
        InteractiveResponse::Redirect { location, flash } => {
            assert_eq!(location, "admin/auth/forgotpassword");
            assert!(flash.starts_with("Too many failed attempts"));
        }
        other => panic!("Expected redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_blank_credentials_are_rejected_without_counting() {
    let rampart = rampart().await;
    let authenticator = StaticAuthenticator::default();
    let session = MemorySessionStore::new();

    let response = rampart
        .customer_login(
            &authenticator,
            &Credentials::new("alice@example.com", ""),
            StoreScope::global(),
            &session,
        )
        .await;
    assert_eq!(response.flash(), Some(messages::INVALID_CREDENTIALS));
    assert_eq!(authenticator.calls(), 0);
    assert!(session.is_empty());

    let err = rampart
        .customer_forgot_password_api(&CountingRequester::default(), "   ", StoreScope::global())
        .await
        .unwrap_err();
    assert_eq!(err, ApiAuthError::InvalidCredentials);
}

#[tokio::test]
async fn test_websites_are_tracked_separately() {
    let rampart = RampartBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .unwrap()
        .apply_migrations(true)
        .with_setting("rampart/customer_login/delay_attempts", "0", ConfigScope::Default)
        .with_setting("rampart/customer_login/lockout_attempts", "2", ConfigScope::Website(1))
        .build()
        .await
        .unwrap();
    let authenticator = StaticAuthenticator::default();

    for _ in 0..2 {
        rampart
            .customer_token(&authenticator, &wrong("alice@example.com"), StoreScope::website(1))
            .await
            .unwrap_err();
    }
    let err = rampart
        .customer_token(
            &authenticator,
            &Credentials::new("alice@example.com", PASSWORD),
            StoreScope::website(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiAuthError::Locked { .. }));
    assert!(err.retry_after().is_some_and(|seconds| seconds > 1700));

    let principal = rampart
        .customer_token(
            &authenticator,
            &Credentials::new("alice@example.com", PASSWORD),
            StoreScope::website(2),
        )
        .await
        .unwrap();
    assert_eq!(principal, "alice@example.com");
}
