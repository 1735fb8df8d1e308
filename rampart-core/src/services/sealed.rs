//! Encrypted JSON blobs in the scoped config store.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::OnceCell;

use crate::{
    Error,
    config::{ConfigScope, paths},
    crypto::{SealingKey, generate_encryption_token},
    error::StorageError,
    repositories::ConfigRepository,
};

/// Encrypted JSON blobs kept in the default config scope.
///
/// The sealing token is read from [`paths::ENCRYPTION_TOKEN`] on first use and
/// generated there if the installation has none yet. Concurrent first uses agree
/// on whichever token was stored first.
pub struct SealedConfig<C: ConfigRepository> {
    repository: Arc<C>,
    key: OnceCell<SealingKey>,
}

impl<C: ConfigRepository> SealedConfig<C> {
    pub fn new(repository: Arc<C>) -> Self {
        Self {
            repository,
            key: OnceCell::new(),
        }
    }

    async fn key(&self) -> Result<&SealingKey, Error> {
        self.key
            .get_or_try_init(|| async {
                let token = match self.read_token().await? {
                    Some(token) => token,
                    None => {
                        let generated = generate_encryption_token();
                        if self
                            .repository
                            .write_if_absent(paths::ENCRYPTION_TOKEN, &generated, ConfigScope::Default)
                            .await?
                        {
                            tracing::info!("Generated installation encryption token");
                        }
                        self.read_token().await?.ok_or_else(|| {
                            StorageError::Corrupt(format!(
                                "{} missing after write",
                                paths::ENCRYPTION_TOKEN
                            ))
                        })?
                    }
                };
                Ok::<_, Error>(SealingKey::from_token(&token)?)
            })
            .await
    }

    async fn read_token(&self) -> Result<Option<String>, Error> {
        let token = self
            .repository
            .read(paths::ENCRYPTION_TOKEN, ConfigScope::Default)
            .await?;
        Ok(token.filter(|token| !token.trim().is_empty()))
    }

    /// Read and decrypt the blob at `path`.
    ///
    /// # Returns
    ///
    /// `None` if nothing is stored there.
    pub async fn load<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, Error> {
        let Some(sealed) = self.repository.read(path, ConfigScope::Default).await? else {
            return Ok(None);
        };
        if sealed.trim().is_empty() {
            return Ok(None);
        }

        let plaintext = self.key().await?.open(&sealed)?;
        let value = serde_json::from_slice(&plaintext)
            .map_err(|e| StorageError::Corrupt(format!("{path}: {e}")))?;
        Ok(Some(value))
    }

    /// Encrypt and write a blob to `path`.
    pub async fn store<T: Serialize>(&self, path: &str, value: &T) -> Result<(), Error> {
        let plaintext =
            serde_json::to_vec(value).map_err(|e| StorageError::Corrupt(format!("{path}: {e}")))?;
        let sealed = self.key().await?.seal(&plaintext)?;
        self.repository
            .write(path, &sealed, ConfigScope::Default)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConfigRepository;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        count: u64,
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let repo = Arc::new(MockConfigRepository::default());
        let sealed = SealedConfig::new(repo.clone());

        assert_eq!(sealed.load::<Blob>("rampart/test").await.unwrap(), None);

        sealed.store("rampart/test", &Blob { count: 3 }).await.unwrap();
        assert_eq!(
            sealed.load::<Blob>("rampart/test").await.unwrap(),
            Some(Blob { count: 3 })
        );

        let raw = repo.raw("rampart/test").unwrap();
        assert!(!raw.contains("count"));
        assert!(repo.raw(paths::ENCRYPTION_TOKEN).is_some());
    }

    #[tokio::test]
    async fn test_token_is_shared_between_instances() {
        let repo = Arc::new(MockConfigRepository::default());
        SealedConfig::new(repo.clone())
            .store("rampart/test", &Blob { count: 9 })
            .await
            .unwrap();

        let reopened = SealedConfig::new(repo);
        assert_eq!(
            reopened.load::<Blob>("rampart/test").await.unwrap(),
            Some(Blob { count: 9 })
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_use_agrees_on_token() {
        let repo = Arc::new(MockConfigRepository::default());
        let first = SealedConfig::new(repo.clone());
        let second = SealedConfig::new(repo.clone());

        let (a, b) = tokio::join!(first.key(), second.key());
        let a = a.unwrap().seal(b"shared").unwrap();
        let b = b.unwrap().seal(b"shared").unwrap();

        assert_eq!(second.key().await.unwrap().open(&a).unwrap(), b"shared");
        assert_eq!(first.key().await.unwrap().open(&b).unwrap(), b"shared");
    }

    #[tokio::test]
    async fn test_stored_token_is_never_replaced() {
        let repo = Arc::new(MockConfigRepository::default());
        let token = generate_encryption_token();
        repo.write(paths::ENCRYPTION_TOKEN, &token, ConfigScope::Default)
            .await
            .unwrap();

        let sealed = SealedConfig::new(repo.clone());
        sealed.store("rampart/test", &Blob { count: 2 }).await.unwrap();
        assert_eq!(repo.raw(paths::ENCRYPTION_TOKEN), Some(token));
    }

    #[tokio::test]
    async fn test_tampered_blob_fails_to_open() {
        let repo = Arc::new(MockConfigRepository::default());
        let sealed = SealedConfig::new(repo.clone());
        sealed.store("rampart/test", &Blob { count: 1 }).await.unwrap();

        repo.write("rampart/test", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", ConfigScope::Default)
            .await
            .unwrap();
        let err = sealed.load::<Blob>("rampart/test").await.unwrap_err();
        assert!(err.is_crypto_error());
    }
}
