//! # Offcache Core
//!
//! Encrypted offline cache for a mail client: server entities are kept in a
//! SQLCipher database on the device so lists can be shown and paged without
//! a network round trip.
//!
//! This crate provides the storage engine, the entity cache and the schema
//! migrator, independent of any host application or CLI.
//!
//! ## Architecture
//!
//! - **storage**: SQLCipher engine (keying, integrity, statements, transactions)
//! - **cache**: Entity cache with list ranges, sync checkpoints and metadata
//! - **migration**: Versioned migration steps and the startup compatibility gate
//! - **crypto**: Key material handed over by the host's secret store
//! - **id**: Identifier ordering shared with the server
//!
//! ## Startup
//!
//! ```no_run
//! use offcache_core::{CacheOptions, CacheStore, DatabaseKey, Migrator};
//! # fn main() -> offcache_core::Result<()> {
//! let key = DatabaseKey::from_bytes([0u8; 32]);
//! let mut store = CacheStore::open("offline.db".as_ref(), &key, &CacheOptions::default())?;
//! Migrator::with_registered_migrations()?.migrate(&mut store)?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod crypto;
pub mod error;
pub mod id;
pub mod migration;
pub mod storage;

pub use cache::{CacheHandle, CacheOptions, CacheStore, ListRange, PersistedEntity};
pub use crypto::DatabaseKey;
pub use error::{OfflineError, Result};
pub use migration::{MigrationReport, Migrator, ModelManifest, OfflineMigration};
pub use storage::{CipherInfo, SqlCipher};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
