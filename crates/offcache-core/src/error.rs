//! Error types for offline cache operations.
//!
//! Errors are descriptive at the core level; the CLI (or any other host
//! application) maps them to user-facing messages. Nothing in this crate
//! retries on failure: the cache is never the source of truth, so the usual
//! recovery for a fatal error is to wipe the file and re-sync from the server.

use thiserror::Error;

/// Result type alias for offline cache operations.
pub type Result<T> = std::result::Result<T, OfflineError>;

/// Core error type for offline cache operations.
#[derive(Debug, Error)]
pub enum OfflineError {
    /// The database file could not be opened or created
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Page authentication failed (tampering, corruption or wrong key)
    #[error("Integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    /// A range-dependent operation ran before any range was stored
    #[error("No range exists for {type_ref} and list {list_id}")]
    NoRange { type_ref: String, list_id: String },

    /// An update that must touch exactly one row touched some other number
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Malformed statement or constraint violation
    #[error("Query error: {source}")]
    Query {
        #[from]
        source: rusqlite::Error,
    },

    /// A required migration is missing from the registered list
    #[error("Programming error: {0}")]
    Programming(String),

    /// A single migration step failed; the stored version was not advanced
    #[error("Migration {app}-v{version} failed: {source}")]
    MigrationFailed {
        app: String,
        version: u32,
        #[source]
        source: Box<OfflineError>,
    },

    /// Operation attempted before `initialize`
    #[error("Storage not initialized")]
    NotInitialized,

    /// Operation attempted after `close`
    #[error("Storage closed")]
    StorageClosed,

    /// Invalid argument supplied by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Metadata or payload JSON could not be encoded or decoded
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// A blocking storage task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl OfflineError {
    /// Whether the cache must be discarded and re-synced after this error.
    ///
    /// These errors mean the file can no longer be trusted (or, for
    /// programming errors, can not be brought to a compatible shape by this
    /// build). Everything else is a per-call failure.
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            OfflineError::IntegrityCheckFailed(_)
                | OfflineError::InvariantViolation(_)
                | OfflineError::Programming(_)
                | OfflineError::MigrationFailed { .. }
        )
    }
}
