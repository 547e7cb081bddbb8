//! Key material for the encrypted cache.
//!
//! The cache never derives or persists its own key. A 256-bit key is handed
//! over by the host's device-bound secret store and installed into SQLCipher
//! as a raw key, so no passphrase KDF runs on open.
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft of the cache file
//! - Tampering with pages at rest (per-page HMAC)
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger
//! - Access to an unlocked process's memory

pub mod key;

pub use key::{DatabaseKey, KEY_LENGTH};
