//! Lifetime caps on how many distinct identifiers each restriction may act on.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    Error,
    config::paths,
    crypto::hash_identifier,
    repositories::ConfigRepository,
    services::sealed::SealedConfig,
    storage::{Surface, UserType, normalize_identifier},
};

/// The protective action a quota category covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionKind {
    Delay,
    Lock,
}

impl RestrictionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestrictionKind::Delay => "delay",
            RestrictionKind::Lock => "lock",
        }
    }
}

/// A restriction quota category, e.g. `customer_delay` or `admin_forgot_password_lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotaCategory {
    pub user_type: UserType,
    pub surface: Surface,
    pub kind: RestrictionKind,
}

impl QuotaCategory {
    pub fn new(user_type: UserType, surface: Surface, kind: RestrictionKind) -> Self {
        Self {
            user_type,
            surface,
            kind,
        }
    }

    pub fn name(&self) -> String {
        match self.surface {
            Surface::Login => format!("{}_{}", self.user_type, self.kind.as_str()),
            Surface::ForgotPassword => {
                format!("{}_{}_{}", self.user_type, self.surface, self.kind.as_str())
            }
        }
    }
}

impl fmt::Display for QuotaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Sealed membership blob for one category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct QuotaState {
    /// `None` means unlimited.
    max_limit: Option<u32>,
    /// Hashed identifiers, never plaintext.
    user_ids: Vec<String>,
}

impl QuotaState {
    fn has_room(&self) -> bool {
        self.max_limit
            .is_none_or(|max| self.user_ids.len() < max as usize)
    }
}

/// Installation-wide ceiling on how many distinct identifiers may ever receive a
/// protective action per category.
///
/// Membership is monotonic: once admitted, an identifier is never removed and is
/// always admitted again, even after the category fills up.
pub struct RestrictionQuota<C: ConfigRepository> {
    sealed: Arc<SealedConfig<C>>,
    write_lock: Mutex<()>,
}

impl<C: ConfigRepository> RestrictionQuota<C> {
    pub fn new(sealed: Arc<SealedConfig<C>>) -> Self {
        Self {
            sealed,
            write_lock: Mutex::new(()),
        }
    }

    async fn state(&self, category: QuotaCategory) -> Result<QuotaState, Error> {
        Ok(self
            .sealed
            .load(&paths::restriction_quota(&category.name()))
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, category: QuotaCategory, state: &QuotaState) -> Result<(), Error> {
        self.sealed
            .store(&paths::restriction_quota(&category.name()), state)
            .await
    }

    fn member_id(identifier: &str) -> String {
        hash_identifier(&normalize_identifier(identifier))
    }

    pub async fn is_member(&self, identifier: &str, category: QuotaCategory) -> Result<bool, Error> {
        let id = Self::member_id(identifier);
        Ok(self.state(category).await?.user_ids.contains(&id))
    }

    /// True if the identifier is a member or there is still room for it.
    pub async fn can_admit(&self, identifier: &str, category: QuotaCategory) -> Result<bool, Error> {
        let id = Self::member_id(identifier);
        let state = self.state(category).await?;
        Ok(state.user_ids.contains(&id) || state.has_room())
    }

    /// Add the identifier to the category. No-op if it is already a member.
    ///
    /// This does not check the limit; use [`RestrictionQuota::try_admit`] for a
    /// checked admission.
    pub async fn admit(&self, identifier: &str, category: QuotaCategory) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let id = Self::member_id(identifier);
        let mut state = self.state(category).await?;
        if !state.user_ids.contains(&id) {
            state.user_ids.push(id);
            self.save(category, &state).await?;
        }
        Ok(())
    }

    /// Admit the identifier if it is a member or there is room for it.
    ///
    /// # Returns
    ///
    /// `false` if the category is full and the identifier is new.
    pub async fn try_admit(&self, identifier: &str, category: QuotaCategory) -> Result<bool, Error> {
        let _guard = self.write_lock.lock().await;
        let id = Self::member_id(identifier);
        let mut state = self.state(category).await?;

        if state.user_ids.contains(&id) {
            return Ok(true);
        }
        if !state.has_room() {
            tracing::info!(
                category = %category,
                members = state.user_ids.len(),
                "Restriction quota refused new identifier"
            );
            return Ok(false);
        }

        state.user_ids.push(id);
        self.save(category, &state).await?;
        Ok(true)
    }

    /// Set the ceiling for a category; `None` lifts it. Existing members are kept.
    pub async fn set_limit(&self, category: QuotaCategory, max: Option<u32>) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.state(category).await?;
        state.max_limit = max;
        self.save(category, &state).await
    }

    pub async fn member_count(&self, category: QuotaCategory) -> Result<usize, Error> {
        Ok(self.state(category).await?.user_ids.len())
    }
}
