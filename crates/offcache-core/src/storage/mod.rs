//! Encrypted storage engine.
//!
//! A thin, typed layer over a SQLCipher database file: keying, integrity
//! verification, schema creation, parameterized statements and immediate
//! transactions. It knows nothing about entities; table definitions come
//! from the cache store that owns it.

pub mod sqlcipher;

pub use sqlcipher::{
    CipherInfo, SqlCipher, Statements, StorageTx, TableDefinition, FIRST_ID_BIGGER,
    FIRST_ID_BIGGER_OR_EQ,
};
