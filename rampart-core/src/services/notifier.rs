//! Lockout notifications: the host's delivery traits and the service that
//! applies toggles and ceilings before calling them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::NotificationError,
    repositories::ConfigRepository,
    services::throttle::{NotificationChannel, NotificationKey, NotificationThrottle},
    storage::{LockKind, Surface, UserType},
};

/// Delivers templated email. Template rendering and transport belong to the host.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(
        &self,
        template: &str,
        recipient: &str,
        vars: &HashMap<String, String>,
    ) -> Result<(), NotificationError>;
}

/// Posts a message to the administrators' notification inbox.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn notify_admin(&self, title: &str, body: &str) -> Result<(), NotificationError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Mailer for LogNotifier {
    async fn send_email(
        &self,
        template: &str,
        recipient: &str,
        _vars: &HashMap<String, String>,
    ) -> Result<(), NotificationError> {
        tracing::info!(template, recipient, "Lockout email (not delivered)");
        Ok(())
    }
}

#[async_trait]
impl AdminNotifier for LogNotifier {
    async fn notify_admin(&self, title: &str, body: &str) -> Result<(), NotificationError> {
        tracing::info!(title, body, "Admin alert (not delivered)");
        Ok(())
    }
}

/// A lock that was just applied and may need announcing.
#[derive(Debug, Clone)]
pub struct LockoutNotice<'a> {
    pub identifier: &'a str,
    pub user_type: UserType,
    pub surface: Surface,
    pub kind: LockKind,
    pub lock_until: Option<DateTime<Utc>>,
    pub recipient: Option<&'a str>,
    pub email_template: &'a str,
    pub notify_admin: bool,
    pub notify_email: bool,
}

impl LockoutNotice<'_> {
    fn vars(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("identifier".to_string(), self.identifier.to_string());
        vars.insert("user_type".to_string(), self.user_type.to_string());
        vars.insert("surface".to_string(), self.surface.to_string());
        vars.insert("lock_type".to_string(), self.kind.to_string());
        if let Some(until) = self.lock_until {
            vars.insert("lock_until".to_string(), until.to_rfc3339());
        }
        vars
    }

    /// The mailbox to write to: the explicit recipient, or the identifier when it
    /// looks like an email address.
    fn email_recipient(&self) -> Option<&str> {
        self.recipient
            .or_else(|| self.identifier.contains('@').then_some(self.identifier))
    }
}

/// Sends lockout notifications through the host's collaborators, subject to the
/// lifetime ceilings of a [`NotificationThrottle`].
///
/// Delivery failures are logged and swallowed.
pub struct NotificationService<C: ConfigRepository> {
    mailer: Arc<dyn Mailer>,
    admin_notifier: Arc<dyn AdminNotifier>,
    throttle: NotificationThrottle<C>,
}

impl<C: ConfigRepository> NotificationService<C> {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        admin_notifier: Arc<dyn AdminNotifier>,
        throttle: NotificationThrottle<C>,
    ) -> Self {
        Self {
            mailer,
            admin_notifier,
            throttle,
        }
    }

    pub fn throttle(&self) -> &NotificationThrottle<C> {
        &self.throttle
    }

    async fn acquire(&self, key: NotificationKey) -> bool {
        match self.throttle.try_acquire(key).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Notification throttle unavailable, skipping");
                false
            }
        }
    }

    /// Announce a lock on every enabled channel with room left.
    pub async fn notify_lockout(&self, notice: &LockoutNotice<'_>) {
        if notice.notify_admin {
            let key = NotificationKey::new(
                NotificationChannel::AdminAlert,
                notice.user_type,
                notice.surface,
            );
            if self.acquire(key).await {
                let title = format!("{} account {} locked", notice.user_type, notice.kind);
                let body = format!(
                    "The {} account {} was {} locked after repeated failed {} attempts.",
                    notice.user_type, notice.identifier, notice.kind, notice.surface
                );
                if let Err(e) = self.admin_notifier.notify_admin(&title, &body).await {
                    tracing::warn!(error = %e, user_type = %notice.user_type, "Failed to send admin alert");
                }
            }
        }

        if notice.notify_email {
            let Some(recipient) = notice.email_recipient() else {
                tracing::debug!(user_type = %notice.user_type, "No mailbox for lockout email");
                return;
            };
            let key =
                NotificationKey::new(NotificationChannel::Email, notice.user_type, notice.surface);
            if self.acquire(key).await {
                if let Err(e) = self
                    .mailer
                    .send_email(notice.email_template, recipient, &notice.vars())
                    .await
                {
                    tracing::warn!(error = %e, template = notice.email_template, "Failed to send lockout email");
                }
            }
        }
    }
}
