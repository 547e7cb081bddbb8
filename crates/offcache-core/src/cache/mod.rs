//! Offline cache store.
//!
//! Entity-shaped API over the encrypted storage engine. Entities are rows
//! keyed by `(type, [listId], elementId)` holding an opaque payload; for
//! every list the store also remembers the contiguous id window that is
//! known to be completely cached, so list reads can be served without a
//! round trip to the server.
//!
//! The store exclusively owns its engine. Callers get values out, never
//! references into storage.

pub mod handle;
pub mod meta;
pub mod types;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::named_params;
use tracing::{debug, info};

use crate::crypto::DatabaseKey;
use crate::error::{OfflineError, Result};
use crate::storage::{CipherInfo, SqlCipher, Statements, TableDefinition};

pub use handle::CacheHandle;
pub use types::{CacheOptions, ListRange, PersistedEntity};

/// Fixed table layout of a cache file.
pub const TABLE_DEFINITIONS: &[TableDefinition] = &[
    TableDefinition {
        name: "list_entities",
        columns: "type TEXT NOT NULL, listId TEXT NOT NULL, elementId TEXT NOT NULL, entity BLOB NOT NULL, PRIMARY KEY (type, listId, elementId)",
    },
    TableDefinition {
        name: "element_entities",
        columns: "type TEXT NOT NULL, elementId TEXT NOT NULL, entity BLOB NOT NULL, PRIMARY KEY (type, elementId)",
    },
    TableDefinition {
        name: "ranges",
        columns: "type TEXT NOT NULL, listId TEXT NOT NULL, lower TEXT NOT NULL, upper TEXT NOT NULL, PRIMARY KEY (type, listId)",
    },
    TableDefinition {
        name: "lastUpdateBatchIdPerGroupId",
        columns: "groupId TEXT NOT NULL, batchId TEXT NOT NULL, PRIMARY KEY (groupId)",
    },
    TableDefinition {
        name: "metadata",
        columns: "key TEXT NOT NULL, value BLOB, PRIMARY KEY (key)",
    },
];

/// Stay well below SQLite's host parameter limit in `IN (...)` deletes.
const DELETE_CHUNK_SIZE: usize = 500;

#[derive(Debug, Clone, Copy)]
enum RangeBound {
    Lower,
    Upper,
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeBound::Lower => write!(f, "lower"),
            RangeBound::Upper => write!(f, "upper"),
        }
    }
}

/// Encrypted offline cache of server entities.
pub struct CacheStore {
    db: SqlCipher,
}

impl CacheStore {
    /// Open (or create) the cache file and bring it to the ready state.
    ///
    /// Installs the key, optionally verifies every page, creates missing
    /// tables and registers the id comparison functions before returning.
    ///
    /// # Errors
    ///
    /// - `OfflineError::StorageUnavailable` if the file cannot be opened
    /// - `OfflineError::IntegrityCheckFailed` on tampering or a wrong key
    pub fn open(path: &Path, key: &DatabaseKey, options: &CacheOptions) -> Result<Self> {
        let mut db = SqlCipher::open(path)?;
        db.initialize(key, options.verify_integrity)?;
        db.create_schema(TABLE_DEFINITIONS)?;
        db.register_id_comparison_functions()?;
        debug!(path = %path.display(), "cache store ready");
        Ok(Self { db })
    }

    /// Path of the cache file.
    pub fn path(&self) -> &Path {
        self.db.path()
    }

    // --- Entities ---

    /// Insert or replace an entity in the partition chosen by `list_id`.
    pub fn put(
        &mut self,
        type_ref: &str,
        list_id: Option<&str>,
        element_id: &str,
        entity: &[u8],
    ) -> Result<()> {
        put_on(&self.db, type_ref, list_id, element_id, entity)
    }

    /// Insert or replace a batch of entities in one transaction.
    pub fn put_all(&mut self, entities: &[PersistedEntity]) -> Result<()> {
        self.db.transaction(|tx| {
            for entity in entities {
                put_on(
                    tx,
                    &entity.type_ref,
                    entity.list_id.as_deref(),
                    &entity.element_id,
                    &entity.entity,
                )?;
            }
            Ok(())
        })
    }

    /// Point lookup. `None` means "not cached".
    pub fn get(
        &self,
        type_ref: &str,
        list_id: Option<&str>,
        element_id: &str,
    ) -> Result<Option<Vec<u8>>> {
        match list_id {
            None => self.db.query_one(
                "SELECT entity FROM element_entities WHERE type = :type AND elementId = :elementId",
                named_params! { ":type": type_ref, ":elementId": element_id },
                |row| row.get(0),
            ),
            Some(list_id) => self.db.query_one(
                "SELECT entity FROM list_entities WHERE type = :type AND listId = :listId AND elementId = :elementId",
                named_params! { ":type": type_ref, ":listId": list_id, ":elementId": element_id },
                |row| row.get(0),
            ),
        }
    }

    /// Every cached entity of a list, in no particular order.
    pub fn get_whole_list(&self, type_ref: &str, list_id: &str) -> Result<Vec<Vec<u8>>> {
        self.db.query_all(
            "SELECT entity FROM list_entities WHERE type = :type AND listId = :listId",
            named_params! { ":type": type_ref, ":listId": list_id },
            |row| row.get(0),
        )
    }

    /// Every cached list entity of a type, across all lists.
    pub fn get_list_elements_of_type(&self, type_ref: &str) -> Result<Vec<Vec<u8>>> {
        self.db.query_all(
            "SELECT entity FROM list_entities WHERE type = :type",
            named_params! { ":type": type_ref },
            |row| row.get(0),
        )
    }

    /// Every cached entity of a type from both partitions, with keys.
    pub fn entities_of_type(&self, type_ref: &str) -> Result<Vec<PersistedEntity>> {
        let mut entities = self.db.query_all(
            "SELECT listId, elementId, entity FROM list_entities WHERE type = :type",
            named_params! { ":type": type_ref },
            |row| {
                Ok(PersistedEntity {
                    type_ref: type_ref.to_string(),
                    list_id: Some(row.get(0)?),
                    element_id: row.get(1)?,
                    entity: row.get(2)?,
                })
            },
        )?;
        let elements = self.db.query_all(
            "SELECT elementId, entity FROM element_entities WHERE type = :type",
            named_params! { ":type": type_ref },
            |row| {
                Ok(PersistedEntity {
                    type_ref: type_ref.to_string(),
                    list_id: None,
                    element_id: row.get(0)?,
                    entity: row.get(1)?,
                })
            },
        )?;
        entities.extend(elements);
        Ok(entities)
    }

    /// Remove one entity. Removing an entity that is not cached is a no-op.
    pub fn delete_entity(
        &mut self,
        type_ref: &str,
        list_id: Option<&str>,
        element_id: &str,
    ) -> Result<()> {
        match list_id {
            None => self.db.execute(
                "DELETE FROM element_entities WHERE type = :type AND elementId = :elementId",
                named_params! { ":type": type_ref, ":elementId": element_id },
            )?,
            Some(list_id) => self.db.execute(
                "DELETE FROM list_entities WHERE type = :type AND listId = :listId AND elementId = :elementId",
                named_params! { ":type": type_ref, ":listId": list_id, ":elementId": element_id },
            )?,
        };
        Ok(())
    }

    /// Remove several entities of one type (and list) at once.
    ///
    /// Returns the number of rows removed.
    pub fn delete_entities_by_ids(
        &mut self,
        type_ref: &str,
        list_id: Option<&str>,
        element_ids: &[String],
    ) -> Result<usize> {
        if element_ids.is_empty() {
            return Ok(0);
        }

        self.db.transaction(|tx| {
            let mut removed = 0;
            for chunk in element_ids.chunks(DELETE_CHUNK_SIZE) {
                let placeholders = vec!["?"; chunk.len()].join(",");
                let mut values: Vec<&str> = vec![type_ref];
                let sql = match list_id {
                    None => format!(
                        "DELETE FROM element_entities WHERE type = ? AND elementId IN ({})",
                        placeholders
                    ),
                    Some(list_id) => {
                        values.push(list_id);
                        format!(
                            "DELETE FROM list_entities WHERE type = ? AND listId = ? AND elementId IN ({})",
                            placeholders
                        )
                    }
                };
                values.extend(chunk.iter().map(String::as_str));
                removed += tx.execute(&sql, rusqlite::params_from_iter(values))?;
            }
            Ok(removed)
        })
    }

    /// Remove a list's entities and its range record atomically.
    pub fn delete_list(&mut self, type_ref: &str, list_id: &str) -> Result<()> {
        self.db.transaction(|tx| {
            tx.execute(
                "DELETE FROM list_entities WHERE type = :type AND listId = :listId",
                named_params! { ":type": type_ref, ":listId": list_id },
            )?;
            delete_range_on(tx, type_ref, list_id)
        })?;
        debug!(type_ref, list_id, "deleted cached list");
        Ok(())
    }

    /// Remove every entity and range record of a type.
    pub fn delete_all_of_type(&mut self, type_ref: &str) -> Result<usize> {
        let removed = self.db.transaction(|tx| {
            let lists = tx.execute(
                "DELETE FROM list_entities WHERE type = :type",
                named_params! { ":type": type_ref },
            )?;
            let elements = tx.execute(
                "DELETE FROM element_entities WHERE type = :type",
                named_params! { ":type": type_ref },
            )?;
            tx.execute(
                "DELETE FROM ranges WHERE type = :type",
                named_params! { ":type": type_ref },
            )?;
            Ok(lists + elements)
        })?;
        debug!(type_ref, removed, "deleted all cached instances of type");
        Ok(removed)
    }

    // --- Ranges ---

    /// The cached window of a list, if any.
    pub fn get_range(&self, type_ref: &str, list_id: &str) -> Result<Option<ListRange>> {
        get_range_on(&self.db, type_ref, list_id)
    }

    /// Create or replace the cached window of a list.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::InvalidInput` if `lower` is bigger than `upper`.
    pub fn set_range(&mut self, type_ref: &str, list_id: &str, lower: &str, upper: &str) -> Result<()> {
        let range = ListRange::new(lower, upper);
        ensure_ordered(&range)?;
        self.db.execute(
            "INSERT OR REPLACE INTO ranges VALUES (:type, :listId, :lower, :upper)",
            named_params! {
                ":type": type_ref,
                ":listId": list_id,
                ":lower": range.lower,
                ":upper": range.upper,
            },
        )?;
        Ok(())
    }

    /// Move the upper bound of an existing range.
    ///
    /// # Errors
    ///
    /// - `OfflineError::NoRange` if no range exists yet
    /// - `OfflineError::InvariantViolation` if the update did not touch exactly one row
    pub fn extend_range_upper(&mut self, type_ref: &str, list_id: &str, upper: &str) -> Result<()> {
        self.update_range_bound(type_ref, list_id, RangeBound::Upper, upper)
    }

    /// Move the lower bound of an existing range.
    ///
    /// # Errors
    ///
    /// - `OfflineError::NoRange` if no range exists yet
    /// - `OfflineError::InvariantViolation` if the update did not touch exactly one row
    pub fn extend_range_lower(&mut self, type_ref: &str, list_id: &str, lower: &str) -> Result<()> {
        self.update_range_bound(type_ref, list_id, RangeBound::Lower, lower)
    }

    /// Drop the range record of a list, keeping its entities.
    pub fn delete_range(&mut self, type_ref: &str, list_id: &str) -> Result<()> {
        delete_range_on(&self.db, type_ref, list_id)
    }

    /// Ids of the cached list entities inside the list's range, ascending.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::NoRange` when the list has no range. That is
    /// different from a range that covers no entities: without a range the
    /// caller has to fetch before it can trust completeness.
    pub fn get_ids_in_range(&self, type_ref: &str, list_id: &str) -> Result<Vec<String>> {
        let range = self
            .get_range(type_ref, list_id)?
            .ok_or_else(|| no_range(type_ref, list_id))?;

        let ids: Vec<String> = self.db.query_all(
            "SELECT elementId FROM list_entities \
             WHERE type = :type AND listId = :listId \
             AND firstIdBiggerOrEq(elementId, :lower) AND NOT(firstIdBigger(elementId, :upper)) \
             ORDER BY LENGTH(elementId) ASC, elementId ASC",
            named_params! {
                ":type": type_ref,
                ":listId": list_id,
                ":lower": range.lower,
                ":upper": range.upper,
            },
            |row| row.get(0),
        )?;
        debug_assert!(ids.iter().all(|id| range.contains(id)));
        Ok(ids)
    }

    /// Up to `count` entities after (or, with `reverse`, before) `start`.
    ///
    /// `start` itself is never included, so pages can be chained by passing
    /// the last id of the previous page. Results are ascending for forward
    /// reads and descending for reverse reads. Fewer than `count` rows come
    /// back when the list runs out; that is not an error.
    pub fn provide_from_range(
        &self,
        type_ref: &str,
        list_id: &str,
        start: &str,
        count: usize,
        reverse: bool,
    ) -> Result<Vec<Vec<u8>>> {
        let count = i64::try_from(count)
            .map_err(|_| OfflineError::InvalidInput(format!("Count too large: {}", count)))?;
        let sql = if reverse {
            "SELECT entity FROM list_entities \
             WHERE type = :type AND listId = :listId AND firstIdBigger(:start, elementId) \
             ORDER BY LENGTH(elementId) DESC, elementId DESC LIMIT :count"
        } else {
            "SELECT entity FROM list_entities \
             WHERE type = :type AND listId = :listId AND firstIdBigger(elementId, :start) \
             ORDER BY LENGTH(elementId) ASC, elementId ASC LIMIT :count"
        };

        self.db.query_all(
            sql,
            named_params! {
                ":type": type_ref,
                ":listId": list_id,
                ":start": start,
                ":count": count,
            },
            |row| row.get(0),
        )
    }

    fn update_range_bound(
        &mut self,
        type_ref: &str,
        list_id: &str,
        bound: RangeBound,
        id: &str,
    ) -> Result<()> {
        self.db.transaction(|tx| {
            let current =
                get_range_on(tx, type_ref, list_id)?.ok_or_else(|| no_range(type_ref, list_id))?;
            let updated = match bound {
                RangeBound::Lower => ListRange::new(id, current.upper),
                RangeBound::Upper => ListRange::new(current.lower, id),
            };
            ensure_ordered(&updated)?;

            let sql = match bound {
                RangeBound::Lower => {
                    "UPDATE ranges SET lower = :id WHERE type = :type AND listId = :listId"
                }
                RangeBound::Upper => {
                    "UPDATE ranges SET upper = :id WHERE type = :type AND listId = :listId"
                }
            };
            let changes = tx.execute(
                sql,
                named_params! { ":id": id, ":type": type_ref, ":listId": list_id },
            )?;
            if changes != 1 {
                return Err(OfflineError::InvariantViolation(format!(
                    "Updating {} range bound of {} list {} touched {} rows, expected 1",
                    bound, type_ref, list_id, changes
                )));
            }
            Ok(())
        })
    }

    // --- Group batch checkpoints ---

    pub fn get_last_batch_id_for_group(&self, group_id: &str) -> Result<Option<String>> {
        self.db.query_one(
            "SELECT batchId FROM lastUpdateBatchIdPerGroupId WHERE groupId = :groupId",
            named_params! { ":groupId": group_id },
            |row| row.get(0),
        )
    }

    pub fn set_last_batch_id_for_group(&mut self, group_id: &str, batch_id: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO lastUpdateBatchIdPerGroupId VALUES (:groupId, :batchId)",
            named_params! { ":groupId": group_id, ":batchId": batch_id },
        )?;
        Ok(())
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Option<Vec<u8>>> = self.db.query_one(
            "SELECT value FROM metadata WHERE key = :key",
            named_params! { ":key": key },
            |row| row.get(0),
        )?;
        Ok(value.flatten())
    }

    pub fn set_metadata(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO metadata VALUES (:key, :value)",
            named_params! { ":key": key, ":value": value },
        )?;
        Ok(())
    }

    /// All metadata entries, keyed by name.
    pub fn dump_all_metadata(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let rows = self.db.query_all("SELECT key, value FROM metadata", [], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<Vec<u8>>>(1)?.unwrap_or_default(),
            ))
        })?;
        Ok(rows.into_iter().collect())
    }

    /// Model version stored for `app`, if any.
    pub fn stored_model_version(&self, app: &str) -> Result<Option<u32>> {
        self.get_metadata(&meta::model_version_key(app))?
            .map(|bytes| meta::decode_version(&bytes))
            .transpose()
    }

    pub fn set_stored_model_version(&mut self, app: &str, version: u32) -> Result<()> {
        let value = meta::encode_version(version)?;
        self.set_metadata(&meta::model_version_key(app), &value)
    }

    pub fn last_update_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_metadata(meta::LAST_UPDATE_TIME)?
            .map(|bytes| meta::decode_time(&bytes))
            .transpose()
    }

    pub fn set_last_update_time(&mut self, time: DateTime<Utc>) -> Result<()> {
        let value = meta::encode_time(time)?;
        self.set_metadata(meta::LAST_UPDATE_TIME, &value)
    }

    pub fn time_range_days(&self) -> Result<Option<u32>> {
        self.get_metadata(meta::TIME_RANGE_DAYS)?
            .map(|bytes| meta::decode_version(&bytes))
            .transpose()
    }

    pub fn set_time_range_days(&mut self, days: u32) -> Result<()> {
        let value = meta::encode_version(days)?;
        self.set_metadata(meta::TIME_RANGE_DAYS, &value)
    }

    pub fn last_compaction_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_metadata(meta::LAST_COMPACTION_TIME)?
            .map(|bytes| meta::decode_time(&bytes))
            .transpose()
    }

    // --- Maintenance ---

    /// Rewrite the file to reclaim space (`VACUUM`).
    ///
    /// Expensive. Cannot run inside a transaction.
    pub fn compact(&mut self) -> Result<()> {
        self.db.compact()
    }

    /// Compact if the last compaction is older than `interval` (or never
    /// happened), then record `now` as the compaction time.
    ///
    /// Returns whether a compaction ran.
    pub fn compact_if_due(&mut self, now: DateTime<Utc>, interval: Duration) -> Result<bool> {
        if let Some(last) = self.last_compaction_time()? {
            if now.signed_duration_since(last) < interval {
                debug!(%last, "skipping compaction, not due yet");
                return Ok(false);
            }
        }

        self.compact()?;
        let value = meta::encode_time(now)?;
        self.set_metadata(meta::LAST_COMPACTION_TIME, &value)?;
        info!(path = %self.path().display(), "compacted cache database");
        Ok(true)
    }

    /// Delete every row of every table, keeping the schema.
    pub fn purge(&mut self) -> Result<()> {
        self.db.purge_all_tables()
    }

    /// Re-run the page authentication check on the open file.
    pub fn check_integrity(&self) -> Result<()> {
        self.db.check_integrity()
    }

    pub fn cipher_info(&self) -> Result<CipherInfo> {
        self.db.cipher_info()
    }

    /// Close the file. Every later call fails with `StorageClosed`.
    pub fn close(&mut self) -> Result<()> {
        self.db.close()
    }

    pub fn is_closed(&self) -> bool {
        self.db.is_closed()
    }
}

fn put_on<S: Statements>(
    db: &S,
    type_ref: &str,
    list_id: Option<&str>,
    element_id: &str,
    entity: &[u8],
) -> Result<()> {
    match list_id {
        None => db.execute(
            "INSERT OR REPLACE INTO element_entities VALUES (:type, :elementId, :entity)",
            named_params! { ":type": type_ref, ":elementId": element_id, ":entity": entity },
        )?,
        Some(list_id) => db.execute(
            "INSERT OR REPLACE INTO list_entities VALUES (:type, :listId, :elementId, :entity)",
            named_params! {
                ":type": type_ref,
                ":listId": list_id,
                ":elementId": element_id,
                ":entity": entity,
            },
        )?,
    };
    Ok(())
}

fn get_range_on<S: Statements>(db: &S, type_ref: &str, list_id: &str) -> Result<Option<ListRange>> {
    db.query_one(
        "SELECT lower, upper FROM ranges WHERE type = :type AND listId = :listId",
        named_params! { ":type": type_ref, ":listId": list_id },
        |row| {
            Ok(ListRange {
                lower: row.get(0)?,
                upper: row.get(1)?,
            })
        },
    )
}

fn delete_range_on<S: Statements>(db: &S, type_ref: &str, list_id: &str) -> Result<()> {
    db.execute(
        "DELETE FROM ranges WHERE type = :type AND listId = :listId",
        named_params! { ":type": type_ref, ":listId": list_id },
    )?;
    Ok(())
}

fn ensure_ordered(range: &ListRange) -> Result<()> {
    if !range.is_ordered() {
        return Err(OfflineError::InvalidInput(format!(
            "Range lower bound {} is bigger than upper bound {}",
            range.lower, range.upper
        )));
    }
    Ok(())
}

fn no_range(type_ref: &str, list_id: &str) -> OfflineError {
    OfflineError::NoRange {
        type_ref: type_ref.to_string(),
        list_id: list_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    const MAIL: &str = "tutanota/Mail";
    const LIST: &str = "mailbox-1";

    fn open_store() -> (TempDir, CacheStore) {
        let dir = tempdir().unwrap();
        let key = DatabaseKey::from_bytes([7; 32]);
        let store = CacheStore::open(&dir.path().join("offline.db"), &key, &CacheOptions::default())
            .unwrap();
        (dir, store)
    }

    fn put_mails(store: &mut CacheStore, ids: &[&str]) {
        for id in ids {
            store.put(MAIL, Some(LIST), id, id.as_bytes()).unwrap();
        }
    }

    fn as_strings(payloads: Vec<Vec<u8>>) -> Vec<String> {
        payloads
            .into_iter()
            .map(|p| String::from_utf8(p).unwrap())
            .collect()
    }

    #[test]
    fn test_put_get_round_trip() {
        let (_dir, mut store) = open_store();
        store.put(MAIL, Some(LIST), "1", b"\x01\x02").unwrap();
        store.put("sys/User", None, "u1", b"").unwrap();

        assert_eq!(store.get(MAIL, Some(LIST), "1").unwrap(), Some(vec![1, 2]));
        assert_eq!(store.get("sys/User", None, "u1").unwrap(), Some(Vec::new()));
        assert_eq!(store.get(MAIL, Some(LIST), "2").unwrap(), None);
    }

    #[test]
    fn test_put_replaces_existing_entity() {
        let (_dir, mut store) = open_store();
        store.put(MAIL, Some(LIST), "1", b"old").unwrap();
        store.put(MAIL, Some(LIST), "1", b"new").unwrap();
        assert_eq!(store.get(MAIL, Some(LIST), "1").unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.get_whole_list(MAIL, LIST).unwrap().len(), 1);
    }

    #[test]
    fn test_partitions_do_not_mix() {
        let (_dir, mut store) = open_store();
        store.put(MAIL, Some(LIST), "1", b"list").unwrap();

        assert_eq!(store.get(MAIL, None, "1").unwrap(), None);
        store.delete_entity(MAIL, None, "1").unwrap();
        assert!(store.get(MAIL, Some(LIST), "1").unwrap().is_some());
    }

    #[test]
    fn test_element_entities_stay_out_of_list_reads() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1", "3"]);
        store.put(MAIL, None, "2", b"element").unwrap();
        store.set_range(MAIL, LIST, "1", "3").unwrap();

        assert_eq!(
            as_strings(store.get_whole_list(MAIL, LIST).unwrap()),
            vec!["1", "3"]
        );
        assert_eq!(store.get_ids_in_range(MAIL, LIST).unwrap(), vec!["1", "3"]);
        let page = store
            .provide_from_range(MAIL, LIST, crate::id::GENERATED_MIN_ID, 10, false)
            .unwrap();
        assert_eq!(as_strings(page), vec!["1", "3"]);
        assert_eq!(store.get(MAIL, None, "2").unwrap(), Some(b"element".to_vec()));
    }

    #[test]
    fn test_ids_in_range_includes_both_bounds() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["9", "10", "30", "50", "51"]);
        store.set_range(MAIL, LIST, "10", "50").unwrap();

        assert_eq!(
            store.get_ids_in_range(MAIL, LIST).unwrap(),
            vec!["10", "30", "50"]
        );
    }

    #[test]
    fn test_ids_in_range_with_single_id_range() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["0"]);
        store.set_range(MAIL, LIST, "0", "0").unwrap();

        assert_eq!(store.get_ids_in_range(MAIL, LIST).unwrap(), vec!["0"]);
    }

    #[test]
    fn test_ids_in_range_filters_and_orders() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["100", "20", "9", "35", "51"]);
        store.set_range(MAIL, LIST, "10", "50").unwrap();

        assert_eq!(store.get_ids_in_range(MAIL, LIST).unwrap(), vec!["20", "35"]);
    }

    #[test]
    fn test_ids_in_range_without_range() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1"]);

        let result = store.get_ids_in_range(MAIL, LIST);
        assert!(matches!(result, Err(OfflineError::NoRange { .. })));
    }

    #[test]
    fn test_extend_range_upper_without_range() {
        let (_dir, mut store) = open_store();
        let result = store.extend_range_upper(MAIL, LIST, "5");
        assert!(matches!(result, Err(OfflineError::NoRange { .. })));
        assert_eq!(store.get_range(MAIL, LIST).unwrap(), None);
    }

    #[test]
    fn test_extend_range_bounds() {
        let (_dir, mut store) = open_store();
        store.set_range(MAIL, LIST, "10", "20").unwrap();

        store.extend_range_upper(MAIL, LIST, "30").unwrap();
        store.extend_range_lower(MAIL, LIST, "5").unwrap();

        assert_eq!(
            store.get_range(MAIL, LIST).unwrap(),
            Some(ListRange::new("5", "30"))
        );
    }

    #[test]
    fn test_range_bounds_must_stay_ordered() {
        let (_dir, mut store) = open_store();
        assert!(matches!(
            store.set_range(MAIL, LIST, "20", "10"),
            Err(OfflineError::InvalidInput(_))
        ));

        store.set_range(MAIL, LIST, "10", "20").unwrap();
        assert!(matches!(
            store.extend_range_upper(MAIL, LIST, "9"),
            Err(OfflineError::InvalidInput(_))
        ));
        assert_eq!(
            store.get_range(MAIL, LIST).unwrap(),
            Some(ListRange::new("10", "20"))
        );
    }

    #[test]
    fn test_provide_from_range_forward_excludes_start() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1", "2", "3", "4", "10"]);

        let page = store.provide_from_range(MAIL, LIST, "2", 2, false).unwrap();
        assert_eq!(as_strings(page), vec!["3", "4"]);

        let next = store.provide_from_range(MAIL, LIST, "4", 2, false).unwrap();
        assert_eq!(as_strings(next), vec!["10"]);
    }

    #[test]
    fn test_provide_from_range_reverse() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1", "2", "3", "10"]);

        let page = store.provide_from_range(MAIL, LIST, "10", 2, true).unwrap();
        assert_eq!(as_strings(page), vec!["3", "2"]);

        let from_max = store
            .provide_from_range(MAIL, LIST, crate::id::GENERATED_MAX_ID, 10, true)
            .unwrap();
        assert_eq!(as_strings(from_max), vec!["10", "3", "2", "1"]);
    }

    #[test]
    fn test_provide_from_range_zero_count() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1"]);
        let page = store
            .provide_from_range(MAIL, LIST, crate::id::GENERATED_MIN_ID, 0, false)
            .unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_delete_list_removes_entities_and_range() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1", "2"]);
        store.put(MAIL, Some("other"), "1", b"x").unwrap();
        store.set_range(MAIL, LIST, "1", "2").unwrap();

        store.delete_list(MAIL, LIST).unwrap();

        assert!(store.get_whole_list(MAIL, LIST).unwrap().is_empty());
        assert_eq!(store.get_range(MAIL, LIST).unwrap(), None);
        assert_eq!(store.get_whole_list(MAIL, "other").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_list_rolls_back_when_range_delete_fails() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1", "2"]);
        store.set_range(MAIL, LIST, "1", "2").unwrap();
        store
            .db
            .execute(
                "CREATE TRIGGER keep_ranges BEFORE DELETE ON ranges \
                 BEGIN SELECT RAISE(ABORT, 'ranges are read-only'); END",
                [],
            )
            .unwrap();

        let result = store.delete_list(MAIL, LIST);
        assert!(matches!(result, Err(OfflineError::Query { .. })));

        assert_eq!(store.get_whole_list(MAIL, LIST).unwrap().len(), 2);
        assert_eq!(
            store.get_range(MAIL, LIST).unwrap(),
            Some(ListRange::new("1", "2"))
        );
    }

    #[test]
    fn test_delete_entities_by_ids() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1", "2", "3"]);

        let ids = vec!["1".to_string(), "3".to_string(), "missing".to_string()];
        let removed = store.delete_entities_by_ids(MAIL, Some(LIST), &ids).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(as_strings(store.get_whole_list(MAIL, LIST).unwrap()), vec!["2"]);

        assert_eq!(store.delete_entities_by_ids(MAIL, Some(LIST), &[]).unwrap(), 0);
    }

    #[test]
    fn test_delete_entities_by_ids_in_large_batches() {
        let (_dir, mut store) = open_store();
        let ids: Vec<String> = (0..1200).map(|i| i.to_string()).collect();
        let entities: Vec<PersistedEntity> = ids
            .iter()
            .map(|id| PersistedEntity::element("sys/Session", id.clone(), Vec::new()))
            .collect();
        store.put_all(&entities).unwrap();

        let removed = store.delete_entities_by_ids("sys/Session", None, &ids).unwrap();
        assert_eq!(removed, 1200);
        assert!(store.entities_of_type("sys/Session").unwrap().is_empty());
    }

    #[test]
    fn test_delete_all_of_type() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1", "2"]);
        store.put(MAIL, None, "e", b"").unwrap();
        store.put("tutanota/Contact", Some("c"), "1", b"").unwrap();
        store.set_range(MAIL, LIST, "1", "2").unwrap();

        assert_eq!(store.delete_all_of_type(MAIL).unwrap(), 3);
        assert!(store.entities_of_type(MAIL).unwrap().is_empty());
        assert_eq!(store.get_range(MAIL, LIST).unwrap(), None);
        assert_eq!(store.get_list_elements_of_type("tutanota/Contact").unwrap().len(), 1);
    }

    #[test]
    fn test_batch_checkpoints() {
        let (_dir, mut store) = open_store();
        assert_eq!(store.get_last_batch_id_for_group("g1").unwrap(), None);

        store.set_last_batch_id_for_group("g1", "b1").unwrap();
        store.set_last_batch_id_for_group("g1", "b2").unwrap();
        assert_eq!(
            store.get_last_batch_id_for_group("g1").unwrap(),
            Some("b2".to_string())
        );
    }

    #[test]
    fn test_typed_metadata() {
        let (_dir, mut store) = open_store();
        assert_eq!(store.stored_model_version("tutanota").unwrap(), None);

        store.set_stored_model_version("tutanota", 65).unwrap();
        store.set_time_range_days(31).unwrap();

        assert_eq!(store.stored_model_version("tutanota").unwrap(), Some(65));
        assert_eq!(store.time_range_days().unwrap(), Some(31));

        let dump = store.dump_all_metadata().unwrap();
        assert_eq!(dump.get("tutanota-version"), Some(&b"65".to_vec()));
    }

    #[test]
    fn test_compact_if_due() {
        let (_dir, mut store) = open_store();
        let now = Utc::now();
        let interval = Duration::days(7);

        assert!(store.compact_if_due(now, interval).unwrap());
        assert!(!store.compact_if_due(now + Duration::days(1), interval).unwrap());
        assert!(store.compact_if_due(now + Duration::days(8), interval).unwrap());
    }

    #[test]
    fn test_purge_empties_everything() {
        let (_dir, mut store) = open_store();
        put_mails(&mut store, &["1"]);
        store.set_range(MAIL, LIST, "1", "1").unwrap();
        store.set_metadata("k", b"v").unwrap();

        store.purge().unwrap();

        assert!(store.get_whole_list(MAIL, LIST).unwrap().is_empty());
        assert_eq!(store.get_range(MAIL, LIST).unwrap(), None);
        assert!(store.dump_all_metadata().unwrap().is_empty());
    }

    #[test]
    fn test_closed_store_rejects_calls() {
        let (_dir, mut store) = open_store();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(
            store.get(MAIL, Some(LIST), "1"),
            Err(OfflineError::StorageClosed)
        ));
    }
}
