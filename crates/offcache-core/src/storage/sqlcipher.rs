//! SQLCipher storage engine.
//!
//! Wraps a single `rusqlite` connection to a SQLCipher database file. Every
//! page is encrypted with AES-256 and carries an HMAC, the salt lives in the
//! first 16 bytes of the file, and the key is passed in raw form so no KDF
//! runs on open.
//!
//! Lifecycle: [`SqlCipher::open`] leaves the engine uninitialized,
//! [`SqlCipher::initialize`] installs the key and makes it ready, and
//! [`SqlCipher::close`] is terminal.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Params, Row, TransactionBehavior};
use tracing::{debug, warn};

use crate::crypto::DatabaseKey;
use crate::error::{OfflineError, Result};
use crate::id::{first_bigger_or_eq, first_bigger_than_second};

/// SQL function: `firstIdBigger(a, b)` is 1 if id `a` is strictly bigger than `b`.
pub const FIRST_ID_BIGGER: &str = "firstIdBigger";

/// SQL function: `firstIdBiggerOrEq(a, b)` is 1 if id `a` is equal to or bigger than `b`.
pub const FIRST_ID_BIGGER_OR_EQ: &str = "firstIdBiggerOrEq";

/// A table owned by the engine's user: name plus column definition, as it
/// would appear inside `CREATE TABLE name (...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: &'static str,
    pub columns: &'static str,
}

/// Cipher build and configuration, as reported by SQLCipher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CipherInfo {
    pub version: Option<String>,
    pub settings: Vec<String>,
    pub provider: Option<String>,
    pub provider_version: Option<String>,
}

/// Parameterized statement execution, shared by the engine and by the
/// handle passed into [`SqlCipher::transaction`].
pub trait Statements {
    /// Run a single mutating statement and return the number of affected rows.
    fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize>;

    /// Run a read statement returning zero or one row.
    fn query_one<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>;

    /// Run a read statement returning any number of rows.
    fn query_all<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>;
}

enum EngineState {
    Uninitialized(Connection),
    Ready(Connection),
    Closed,
}

/// Encrypted SQLite database file.
pub struct SqlCipher {
    path: PathBuf,
    state: Mutex<EngineState>,
    tables: Vec<&'static str>,
}

/// Statement access inside an immediate transaction.
///
/// Has no `transaction` method: transactions do not nest.
pub struct StorageTx<'a> {
    conn: &'a Connection,
}

impl SqlCipher {
    /// Open or create the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::StorageUnavailable` if the file cannot be
    /// opened or created (missing directory, permissions, invalid path).
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            OfflineError::StorageUnavailable(format!("{}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "opened cache database");

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(EngineState::Uninitialized(conn)),
            tables: Vec::new(),
        })
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Install the encryption key. Must be called exactly once after `open`.
    ///
    /// Always enables SQLCipher memory security, so decrypted page buffers
    /// are wiped when SQLite releases them. With `verify_integrity` every
    /// page HMAC of the existing file is checked before anything is read.
    ///
    /// Disabling the integrity check is only meant for tests and
    /// benchmarks; a tampered page is then detected late, when it is read.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::IntegrityCheckFailed` if a page fails
    /// authentication or the key does not decrypt the file.
    pub fn initialize(&mut self, key: &DatabaseKey, verify_integrity: bool) -> Result<()> {
        let state = self.state_mut()?;
        let conn = match std::mem::replace(state, EngineState::Closed) {
            EngineState::Uninitialized(conn) => conn,
            EngineState::Ready(conn) => {
                *state = EngineState::Ready(conn);
                return Err(OfflineError::InvalidInput(
                    "Storage is already initialized".to_string(),
                ));
            }
            EngineState::Closed => return Err(OfflineError::StorageClosed),
        };

        match install_key(&conn, key, verify_integrity) {
            Ok(()) => {
                *state = EngineState::Ready(conn);
                Ok(())
            }
            Err(err) => {
                *state = EngineState::Uninitialized(conn);
                Err(err)
            }
        }
    }

    /// Create every table that does not exist yet.
    ///
    /// The table names are remembered for [`SqlCipher::purge_all_tables`].
    pub fn create_schema(&mut self, tables: &[TableDefinition]) -> Result<()> {
        self.with_ready(|conn| {
            for table in tables {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    table.name, table.columns
                ))?;
            }
            Ok(())
        })?;

        for table in tables {
            if !self.tables.contains(&table.name) {
                self.tables.push(table.name);
            }
        }
        Ok(())
    }

    /// Install the id-ordering predicates used by range queries.
    ///
    /// SQLite cannot express the length-then-lexicographic ordering with its
    /// native comparisons, so it is pushed down as two deterministic scalar
    /// functions: [`FIRST_ID_BIGGER`] and [`FIRST_ID_BIGGER_OR_EQ`].
    pub fn register_id_comparison_functions(&self) -> Result<()> {
        let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
        self.with_ready(|conn| {
            conn.create_scalar_function(FIRST_ID_BIGGER, 2, flags, |ctx| {
                let first = ctx.get::<String>(0)?;
                let second = ctx.get::<String>(1)?;
                Ok(first_bigger_than_second(&first, &second))
            })?;
            conn.create_scalar_function(FIRST_ID_BIGGER_OR_EQ, 2, flags, |ctx| {
                let first = ctx.get::<String>(0)?;
                let second = ctx.get::<String>(1)?;
                Ok(first_bigger_or_eq(&first, &second))
            })?;
            Ok(())
        })
    }

    /// Run `work` inside an immediate transaction.
    ///
    /// Commits when `work` returns `Ok`, rolls back and propagates the error
    /// otherwise. The exclusive borrow means nothing inside `work` can reach
    /// the engine except through the [`StorageTx`] it is given.
    pub fn transaction<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce(&StorageTx<'_>) -> Result<T>,
    {
        let conn = match self.state_mut()? {
            EngineState::Ready(conn) => conn,
            EngineState::Uninitialized(_) => return Err(OfflineError::NotInitialized),
            EngineState::Closed => return Err(OfflineError::StorageClosed),
        };

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = work(&StorageTx { conn: &tx })?;
        tx.commit()?;
        Ok(result)
    }

    /// Delete all rows from every table created through `create_schema`.
    pub fn purge_all_tables(&mut self) -> Result<()> {
        let tables = self.tables.clone();
        self.transaction(|tx| {
            for name in &tables {
                tx.execute(&format!("DELETE FROM {}", name), [])?;
            }
            Ok(())
        })?;
        debug!(tables = tables.len(), "purged cache tables");
        Ok(())
    }

    /// Rewrite the whole file to reclaim free pages (`VACUUM`).
    ///
    /// Expensive; run only at idle points.
    pub fn compact(&self) -> Result<()> {
        self.with_ready(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(())
        })
    }

    /// Verify every page HMAC of the file.
    pub fn check_integrity(&self) -> Result<()> {
        self.with_ready(run_integrity_check)
    }

    /// Report the cipher build and configuration.
    pub fn cipher_info(&self) -> Result<CipherInfo> {
        self.with_ready(|conn| {
            let single = |pragma: &str| -> Result<Option<String>> {
                let value = conn
                    .query_row(&format!("PRAGMA {}", pragma), [], |row| {
                        row.get::<_, String>(0)
                    })
                    .optional()?;
                Ok(value)
            };

            let mut stmt = conn.prepare("PRAGMA cipher_settings")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut settings = Vec::new();
            for row in rows {
                settings.push(row?);
            }

            Ok(CipherInfo {
                version: single("cipher_version")?,
                settings,
                provider: single("cipher_provider")?,
                provider_version: single("cipher_provider_version")?,
            })
        })
    }

    /// Release the file handle. Every later call fails with `StorageClosed`.
    pub fn close(&mut self) -> Result<()> {
        let state = self.state_mut()?;
        let conn = match std::mem::replace(state, EngineState::Closed) {
            EngineState::Uninitialized(conn) | EngineState::Ready(conn) => conn,
            EngineState::Closed => return Err(OfflineError::StorageClosed),
        };
        conn.close().map_err(|(_, err)| OfflineError::from(err))?;
        debug!(path = %self.path.display(), "closed cache database");
        Ok(())
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        matches!(self.lock_state().as_deref(), Ok(EngineState::Closed))
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| OfflineError::InvariantViolation("SQLCipher connection poisoned".to_string()))
    }

    fn state_mut(&mut self) -> Result<&mut EngineState> {
        self.state
            .get_mut()
            .map_err(|_| OfflineError::InvariantViolation("SQLCipher connection poisoned".to_string()))
    }

    fn with_ready<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock_state()?;
        match &*guard {
            EngineState::Ready(conn) => f(conn),
            EngineState::Uninitialized(_) => Err(OfflineError::NotInitialized),
            EngineState::Closed => Err(OfflineError::StorageClosed),
        }
    }
}

impl Statements for SqlCipher {
    fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.with_ready(|conn| execute_on(conn, sql, params))
    }

    fn query_one<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.with_ready(|conn| query_one_on(conn, sql, params, map))
    }

    fn query_all<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.with_ready(|conn| query_all_on(conn, sql, params, map))
    }
}

impl Statements for StorageTx<'_> {
    fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        execute_on(self.conn, sql, params)
    }

    fn query_one<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        query_one_on(self.conn, sql, params, map)
    }

    fn query_all<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        query_all_on(self.conn, sql, params, map)
    }
}

fn execute_on<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<usize> {
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.execute(params)?)
}

fn query_one_on<T, P, F>(conn: &Connection, sql: &str, params: P, map: F) -> Result<Option<T>>
where
    P: Params,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare_cached(sql)?;
    let value = stmt.query_row(params, map).optional()?;
    Ok(value)
}

fn query_all_on<T, P, F>(conn: &Connection, sql: &str, params: P, map: F) -> Result<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, map)?;
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

fn install_key(conn: &Connection, key: &DatabaseKey, verify_integrity: bool) -> Result<()> {
    conn.pragma_update(None, "cipher_memory_security", "ON")?;

    let literal = key.sqlcipher_literal();
    conn.pragma_update(None, "key", literal.as_str())?;

    if verify_integrity {
        run_integrity_check(conn)?;
    } else {
        warn!("opening cache without integrity check; tampered pages are detected only on read");
    }

    // Touching the schema page is the cheapest way to learn whether the key
    // decrypts this file at all.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(|e| {
        if is_not_a_database(&e) {
            OfflineError::IntegrityCheckFailed(format!(
                "key does not decrypt the database (is the key correct?): {}",
                e
            ))
        } else {
            OfflineError::from(e)
        }
    })?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> Result<()> {
    let failures = (|| -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare("PRAGMA cipher_integrity_check")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect()
    })()
    .map_err(|e| OfflineError::IntegrityCheckFailed(e.to_string()))?;

    if !failures.is_empty() {
        return Err(OfflineError::IntegrityCheckFailed(failures.join("; ")));
    }
    Ok(())
}

fn is_not_a_database(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::NotADatabase)
}
