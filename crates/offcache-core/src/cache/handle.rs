//! Async facade over [`CacheStore`].
//!
//! SQLCipher calls block, so every operation is moved onto tokio's blocking
//! pool. The store sits behind a mutex: operations on one handle (and its
//! clones) run one at a time, in the order they acquire the lock, and a
//! transaction started by one call is never interleaved with another.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::crypto::DatabaseKey;
use crate::error::{OfflineError, Result};
use crate::migration::{MigrationReport, Migrator};

use super::{CacheOptions, CacheStore, ListRange, PersistedEntity};

/// Cloneable async handle to a cache store.
#[derive(Clone)]
pub struct CacheHandle {
    store: Arc<Mutex<CacheStore>>,
}

impl CacheHandle {
    /// Open the cache file on the blocking pool.
    pub async fn open(path: PathBuf, key: DatabaseKey, options: CacheOptions) -> Result<Self> {
        let store = tokio::task::spawn_blocking(move || CacheStore::open(&path, &key, &options))
            .await
            .map_err(|e| OfflineError::Task(e.to_string()))??;
        Ok(Self::from_store(store))
    }

    pub fn from_store(store: CacheStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `op` against the store on the blocking pool.
    ///
    /// Escape hatch for callers that need several operations under one lock
    /// acquisition, e.g. running migrations right after open.
    pub async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CacheStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut guard = store
                .lock()
                .map_err(|_| OfflineError::InvariantViolation("cache store poisoned".to_string()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| OfflineError::Task(e.to_string()))?
    }

    pub async fn put(
        &self,
        type_ref: String,
        list_id: Option<String>,
        element_id: String,
        entity: Vec<u8>,
    ) -> Result<()> {
        self.with_store(move |s| s.put(&type_ref, list_id.as_deref(), &element_id, &entity))
            .await
    }

    pub async fn put_all(&self, entities: Vec<PersistedEntity>) -> Result<()> {
        self.with_store(move |s| s.put_all(&entities)).await
    }

    pub async fn get(
        &self,
        type_ref: String,
        list_id: Option<String>,
        element_id: String,
    ) -> Result<Option<Vec<u8>>> {
        self.with_store(move |s| s.get(&type_ref, list_id.as_deref(), &element_id))
            .await
    }

    pub async fn get_whole_list(&self, type_ref: String, list_id: String) -> Result<Vec<Vec<u8>>> {
        self.with_store(move |s| s.get_whole_list(&type_ref, &list_id))
            .await
    }

    pub async fn delete_entity(
        &self,
        type_ref: String,
        list_id: Option<String>,
        element_id: String,
    ) -> Result<()> {
        self.with_store(move |s| s.delete_entity(&type_ref, list_id.as_deref(), &element_id))
            .await
    }

    pub async fn delete_entities_by_ids(
        &self,
        type_ref: String,
        list_id: Option<String>,
        element_ids: Vec<String>,
    ) -> Result<usize> {
        self.with_store(move |s| s.delete_entities_by_ids(&type_ref, list_id.as_deref(), &element_ids))
            .await
    }

    pub async fn delete_list(&self, type_ref: String, list_id: String) -> Result<()> {
        self.with_store(move |s| s.delete_list(&type_ref, &list_id))
            .await
    }

    pub async fn get_range(&self, type_ref: String, list_id: String) -> Result<Option<ListRange>> {
        self.with_store(move |s| s.get_range(&type_ref, &list_id))
            .await
    }

    pub async fn set_range(
        &self,
        type_ref: String,
        list_id: String,
        lower: String,
        upper: String,
    ) -> Result<()> {
        self.with_store(move |s| s.set_range(&type_ref, &list_id, &lower, &upper))
            .await
    }

    pub async fn extend_range_upper(&self, type_ref: String, list_id: String, upper: String) -> Result<()> {
        self.with_store(move |s| s.extend_range_upper(&type_ref, &list_id, &upper))
            .await
    }

    pub async fn extend_range_lower(&self, type_ref: String, list_id: String, lower: String) -> Result<()> {
        self.with_store(move |s| s.extend_range_lower(&type_ref, &list_id, &lower))
            .await
    }

    pub async fn delete_range(&self, type_ref: String, list_id: String) -> Result<()> {
        self.with_store(move |s| s.delete_range(&type_ref, &list_id))
            .await
    }

    pub async fn get_ids_in_range(&self, type_ref: String, list_id: String) -> Result<Vec<String>> {
        self.with_store(move |s| s.get_ids_in_range(&type_ref, &list_id))
            .await
    }

    pub async fn provide_from_range(
        &self,
        type_ref: String,
        list_id: String,
        start: String,
        count: usize,
        reverse: bool,
    ) -> Result<Vec<Vec<u8>>> {
        self.with_store(move |s| s.provide_from_range(&type_ref, &list_id, &start, count, reverse))
            .await
    }

    pub async fn get_last_batch_id_for_group(&self, group_id: String) -> Result<Option<String>> {
        self.with_store(move |s| s.get_last_batch_id_for_group(&group_id))
            .await
    }

    pub async fn set_last_batch_id_for_group(&self, group_id: String, batch_id: String) -> Result<()> {
        self.with_store(move |s| s.set_last_batch_id_for_group(&group_id, &batch_id))
            .await
    }

    pub async fn get_metadata(&self, key: String) -> Result<Option<Vec<u8>>> {
        self.with_store(move |s| s.get_metadata(&key)).await
    }

    pub async fn set_metadata(&self, key: String, value: Vec<u8>) -> Result<()> {
        self.with_store(move |s| s.set_metadata(&key, &value)).await
    }

    pub async fn dump_all_metadata(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        self.with_store(|s| s.dump_all_metadata()).await
    }

    /// Run `migrator` against the store while holding the lock.
    pub async fn migrate(&self, migrator: Arc<Migrator>) -> Result<MigrationReport> {
        self.with_store(move |s| migrator.migrate(s)).await
    }

    pub async fn compact(&self) -> Result<()> {
        self.with_store(|s| s.compact()).await
    }

    pub async fn compact_if_due(&self, now: DateTime<Utc>, interval: Duration) -> Result<bool> {
        self.with_store(move |s| s.compact_if_due(now, interval))
            .await
    }

    pub async fn purge(&self) -> Result<()> {
        self.with_store(|s| s.purge()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.with_store(|s| s.close()).await
    }
}
