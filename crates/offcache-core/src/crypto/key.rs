//! 256-bit database key.

use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::{OfflineError, Result};

/// Length of the database key in bytes (32 bytes = 256 bits for AES-256).
pub const KEY_LENGTH: usize = 32;

/// A raw AES-256 key for the cache database.
///
/// Key material is zeroized from memory when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DatabaseKey {
    key: [u8; KEY_LENGTH],
}

impl DatabaseKey {
    /// Wrap raw key bytes.
    ///
    /// # Security
    ///
    /// The caller is responsible for ensuring the bytes come from a secure source.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Build a key from a byte slice, which must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            OfflineError::InvalidInput(format!(
                "Database key must be {} bytes (got {})",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Parse a key from 64 hex characters.
    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(value.trim())
                .map_err(|e| OfflineError::InvalidInput(format!("Invalid hex key: {}", e)))?,
        );
        Self::from_slice(&bytes)
    }

    /// Hex-encode the key. The returned buffer is zeroized on drop.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.key))
    }

    /// Get a reference to the raw key bytes.
    ///
    /// # Security
    ///
    /// Avoid storing or logging this value.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// SQLCipher raw-key literal: `x'<64 hex chars>'`.
    pub(crate) fn sqlcipher_literal(&self) -> Zeroizing<String> {
        let hex = self.to_hex();
        Zeroizing::new(format!("x'{}'", hex.as_str()))
    }
}

impl std::fmt::Debug for DatabaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
