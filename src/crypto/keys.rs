//! Shared secret and derived key handling.
//!
//! The controller password is the only key material. The AES key is the
//! SHA-256 digest of its UTF-8 bytes.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::KEY_SIZE;

/// The controller password.
///
/// Zeroized on drop; `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Wrap a password.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Derive the AES-256 key.
    pub fn derive_key(&self) -> SymmetricKey {
        let digest = Sha256::digest(self.0.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        SymmetricKey { key }
    }

    /// Get the raw password.
    ///
    /// # Security
    /// Handle with care - this exposes the controller credential.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

impl From<&str> for SharedSecret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SharedSecret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// AES-256 key derived from a [`SharedSecret`].
///
/// Zeroized on drop for security.
#[derive(Clone)]
pub struct SymmetricKey {
    key: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_sha256_of_secret() {
        let key = SharedSecret::new("password").derive_key();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn test_debug_redacts() {
        let secret = SharedSecret::new("hunter2");
        let rendered = format!("{:?} {:?}", secret, secret.derive_key());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_different_secrets_different_keys() {
        let a = SharedSecret::new("a").derive_key();
        let b = SharedSecret::new("b").derive_key();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
