//! Lifetime ceilings on lockout notifications per channel.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    Error,
    config::paths,
    repositories::ConfigRepository,
    services::sealed::SealedConfig,
    storage::{Surface, UserType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    AdminAlert,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::AdminAlert => "admin_alert",
        }
    }
}

/// One lifetime counter: channel × actor × triggering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    pub channel: NotificationChannel,
    pub user_type: UserType,
    pub trigger: Surface,
}

impl NotificationKey {
    pub fn new(channel: NotificationChannel, user_type: UserType, trigger: Surface) -> Self {
        Self {
            channel,
            user_type,
            trigger,
        }
    }

    pub fn name(&self) -> String {
        format!("{}_{}_{}", self.channel.as_str(), self.user_type, self.trigger)
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ThrottleState {
    max_limit: Option<u32>,
    count: u64,
}

/// Lifetime ceilings on notifications sent, shared by every website.
///
/// Once a counter reaches its ceiling that notification silently stops firing;
/// protection itself is unaffected.
pub struct NotificationThrottle<C: ConfigRepository> {
    sealed: Arc<SealedConfig<C>>,
    write_lock: Mutex<()>,
}

impl<C: ConfigRepository> NotificationThrottle<C> {
    pub fn new(sealed: Arc<SealedConfig<C>>) -> Self {
        Self {
            sealed,
            write_lock: Mutex::new(()),
        }
    }

    async fn state(&self, key: NotificationKey) -> Result<ThrottleState, Error> {
        Ok(self
            .sealed
            .load(&paths::notification_limit(&key.name()))
            .await?
            .unwrap_or_default())
    }

    /// Count one notification if the ceiling allows it.
    ///
    /// # Returns
    ///
    /// `true` if the notification may be sent.
    pub async fn try_acquire(&self, key: NotificationKey) -> Result<bool, Error> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.state(key).await?;

        if state
            .max_limit
            .is_some_and(|max| state.count >= u64::from(max))
        {
            tracing::debug!(key = %key, count = state.count, "Notification ceiling reached");
            return Ok(false);
        }

        state.count += 1;
        self.sealed
            .store(&paths::notification_limit(&key.name()), &state)
            .await?;
        Ok(true)
    }

    /// Set the ceiling for a counter; `None` lifts it. The count is kept.
    pub async fn set_limit(&self, key: NotificationKey, max: Option<u32>) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.state(key).await?;
        state.max_limit = max;
        self.sealed
            .store(&paths::notification_limit(&key.name()), &state)
            .await
    }

    pub async fn count(&self, key: NotificationKey) -> Result<u64, Error> {
        Ok(self.state(key).await?.count)
    }
}
