use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use offcache_core::{CacheOptions, CacheStore, DatabaseKey, OfflineError, PersistedEntity};

const MAIL: &str = "tutanota/Mail";

struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(prefix: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be available")
            .as_nanos();
        let filename = format!("{}_{}_{}.db", prefix, std::process::id(), nanos);
        let path = std::env::temp_dir().join(filename);
        Self { path }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn key() -> DatabaseKey {
    DatabaseKey::from_bytes([0x42; 32])
}

fn open(temp: &TempFile) -> CacheStore {
    CacheStore::open(&temp.path, &key(), &CacheOptions::default()).expect("open should succeed")
}

#[test]
fn test_single_id_range_scenario() {
    let temp = TempFile::new("offcache_single_id_range");
    let mut store = open(&temp);

    store
        .set_range(MAIL, "list1", "0", "0")
        .expect("set_range should succeed");
    store
        .put(MAIL, Some("list1"), "0", b"payload")
        .expect("put should succeed");

    let ids = store
        .get_ids_in_range(MAIL, "list1")
        .expect("range should exist");
    assert_eq!(ids, vec!["0".to_string()]);
}

#[test]
fn test_extend_upper_without_range_is_no_range() {
    let temp = TempFile::new("offcache_extend_no_range");
    let mut store = open(&temp);

    let result = store.extend_range_upper(MAIL, "list1", "99");
    assert!(matches!(result, Err(OfflineError::NoRange { .. })));
}

#[test]
fn test_paging_stops_short_at_list_boundary() {
    let temp = TempFile::new("offcache_paging");
    let mut store = open(&temp);

    let entities: Vec<PersistedEntity> = ["18", "19", "20", "21", "22"]
        .iter()
        .map(|id| PersistedEntity::list_element(MAIL, "list1", *id, id.as_bytes().to_vec()))
        .collect();
    store.put_all(&entities).expect("put_all should succeed");

    let page = store
        .provide_from_range(MAIL, "list1", "20", 3, false)
        .expect("read should succeed");
    assert_eq!(page, vec![b"21".to_vec(), b"22".to_vec()]);
}

#[test]
fn test_entities_survive_reopen() {
    let temp = TempFile::new("offcache_reopen");
    {
        let mut store = open(&temp);
        store
            .put("sys/User", None, "u1", &[0, 1, 2, 255])
            .expect("put should succeed");
        store
            .set_last_batch_id_for_group("group1", "batch7")
            .expect("checkpoint should succeed");
        store.close().expect("close should succeed");
    }

    let store = open(&temp);
    assert_eq!(
        store.get("sys/User", None, "u1").expect("get should succeed"),
        Some(vec![0, 1, 2, 255])
    );
    assert_eq!(
        store
            .get_last_batch_id_for_group("group1")
            .expect("checkpoint read should succeed"),
        Some("batch7".to_string())
    );
}

#[test]
fn test_wrong_key_rejected_even_without_integrity_check() {
    let temp = TempFile::new("offcache_wrong_key");
    {
        let mut store = open(&temp);
        store.put(MAIL, Some("l"), "1", b"x").expect("put should succeed");
        store.close().expect("close should succeed");
    }

    let options = CacheOptions {
        verify_integrity: false,
        ..CacheOptions::default()
    };
    let result = CacheStore::open(&temp.path, &DatabaseKey::from_bytes([1; 32]), &options);
    assert!(matches!(result, Err(OfflineError::IntegrityCheckFailed(_))));
}

#[test]
fn test_tampered_page_detected() {
    let temp = TempFile::new("offcache_tampered");
    {
        let mut store = open(&temp);
        for i in 0..200 {
            store
                .put(MAIL, Some("l"), &i.to_string(), &[7u8; 64])
                .expect("put should succeed");
        }
        store.close().expect("close should succeed");
    }

    let mut bytes = fs::read(&temp.path).expect("read should succeed");
    assert!(bytes.len() > 8192);
    bytes[4096 + 100] ^= 0xff;
    fs::write(&temp.path, &bytes).expect("write should succeed");

    let result = CacheStore::open(&temp.path, &key(), &CacheOptions::default());
    let err = result.err().expect("tampered file must not open");
    assert!(matches!(err, OfflineError::IntegrityCheckFailed(_)));
    assert!(err.requires_resync());
}
