//! Hashing and sealing helpers.
//!
//! Identifiers are never used verbatim as session keys or quota entries; they are
//! reduced to a hex SHA-256 digest first. Installation-wide blobs (restriction quota
//! membership, notification counters) are sealed with ChaCha20-Poly1305 under a
//! 256-bit token kept in the scoped config store.
//!
//! # Sealed format
//!
//! `base64(nonce[12] || ciphertext || tag[16])`, URL-safe alphabet without padding.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// Hash a value into a stable, opaque key.
///
/// # Returns
///
/// A hex-encoded SHA256 hash of the value (64 characters)
pub fn hash_identifier(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh 256-bit encryption token, URL-safe base64 encoded.
///
/// # Panics
///
/// Panics if the OS random number generator fails. There is no meaningful
/// recovery from an unavailable entropy source.
pub fn generate_encryption_token() -> String {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Symmetric key used to seal installation-wide configuration blobs.
#[derive(Clone)]
pub struct SealingKey {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey(..)")
    }
}

impl SealingKey {
    /// Build a key from a token produced by [`generate_encryption_token`].
    pub fn from_token(token: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let cipher = ChaCha20Poly1305::new_from_slice(&bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        Ok(Self { cipher })
    }

    /// Encrypt and encode a plaintext.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| CryptoError::Seal(e.to_string()))?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| CryptoError::Seal(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Decode and decrypt a value produced by [`SealingKey::seal`].
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(sealed.trim())
            .map_err(|e| CryptoError::Open(e.to_string()))?;

        if bytes.len() <= NONCE_SIZE {
            return Err(CryptoError::Open("sealed value too short".to_string()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CryptoError::Open(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic_hex() {
        let hash1 = hash_identifier("alice@example.com1");
        let hash2 = hash_identifier("alice@example.com1");

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
        assert!(hash1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash1, hash_identifier("alice@example.comdefault"));
    }

    #[test]
    fn test_seal_and_open() {
        let key = SealingKey::from_token(&generate_encryption_token()).unwrap();
        let sealed = key.seal(br#"{"max_limit":1,"user_ids":[]}"#).unwrap();

        assert!(!sealed.contains("max_limit"));
        assert_eq!(
            key.open(&sealed).unwrap(),
            br#"{"max_limit":1,"user_ids":[]}"#.to_vec()
        );
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let key = SealingKey::from_token(&generate_encryption_token()).unwrap();
        let other = SealingKey::from_token(&generate_encryption_token()).unwrap();
        let sealed = key.seal(b"count").unwrap();

        assert!(matches!(other.open(&sealed), Err(CryptoError::Open(_))));
    }

    #[test]
    fn test_nonces_differ_between_seals() {
        let key = SealingKey::from_token(&generate_encryption_token()).unwrap();
        assert_ne!(key.seal(b"same").unwrap(), key.seal(b"same").unwrap());
    }

    #[test]
    fn test_rejects_short_tokens() {
        assert!(matches!(
            SealingKey::from_token("c2hvcnQ"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            SealingKey::from_token("not base64 !!"),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
