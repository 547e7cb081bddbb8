//! Offline schema migrations.
//!
//! Every incompatible change to the remote model gets a migration step
//! named after the `(app, version)` that introduced it. On startup the
//! [`Migrator`] seeds missing version entries, runs each step whose version
//! is newer than the stored one, and finally refuses to hand out the cache
//! if any app is still below the version this client is compatible with.
//!
//! Two checks keep the registered list honest:
//! - [`check_migration_completeness`] (run in tests and by `offcache
//!   verify-migrations`) compares the steps to the manifest
//! - the post-run gate in [`Migrator::migrate`] fails with
//!   `OfflineError::Programming` when a needed step was never written

pub mod manifest;
pub mod standard;
pub mod steps;

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::error::{OfflineError, Result};

pub use manifest::{
    check_migration_completeness, CompletenessReport, ModelInfo, ModelManifest, SchemaHistory,
    SchemaVersion, VersionChoice,
};
pub use steps::registered_migrations;

/// One migration step.
pub trait OfflineMigration: Send + Sync {
    /// App namespace, e.g. `"tutanota"`.
    fn app(&self) -> &str;

    /// Model version this step migrates the cache to.
    fn version(&self) -> u32;

    /// Rewrite stored rows to match `version`.
    ///
    /// May run again on a cache where it already ran partially.
    fn migrate(&self, store: &mut CacheStore) -> Result<()>;
}

/// What a call to [`Migrator::migrate`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Apps whose version entry was missing and got the current version
    pub seeded: Vec<String>,

    /// Steps that ran, in order
    pub applied: Vec<VersionChoice>,
}

/// Runs registered migration steps against a cache store.
pub struct Migrator {
    manifest: ModelManifest,
    migrations: Vec<Box<dyn OfflineMigration>>,
}

impl Migrator {
    /// Build a migrator, ordering steps by `(app, version)`.
    ///
    /// # Errors
    ///
    /// Returns `OfflineError::Programming` if a step is registered twice or
    /// belongs to an app the manifest does not know.
    pub fn new(manifest: ModelManifest, mut migrations: Vec<Box<dyn OfflineMigration>>) -> Result<Self> {
        migrations.sort_by(|a, b| (a.app(), a.version()).cmp(&(b.app(), b.version())));

        for pair in migrations.windows(2) {
            if pair[0].app() == pair[1].app() && pair[0].version() == pair[1].version() {
                return Err(OfflineError::Programming(format!(
                    "Migration {}-v{} is registered twice",
                    pair[0].app(),
                    pair[0].version()
                )));
            }
        }
        if let Some(orphan) = migrations
            .iter()
            .find(|m| manifest.model_info(m.app()).is_none())
        {
            return Err(OfflineError::Programming(format!(
                "Migration {}-v{} targets unknown app {}",
                orphan.app(),
                orphan.version(),
                orphan.app()
            )));
        }

        Ok(Self {
            manifest,
            migrations,
        })
    }

    /// The current client manifest with every built-in step.
    pub fn with_registered_migrations() -> Result<Self> {
        Self::new(ModelManifest::current(), registered_migrations())
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    /// Registered steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = VersionChoice> + '_ {
        self.migrations
            .iter()
            .map(|m| VersionChoice::new(m.app(), m.version()))
    }

    pub fn completeness(&self) -> CompletenessReport {
        check_migration_completeness(&self.manifest, &self.migrations)
    }

    /// Bring `store` up to the manifest's model versions.
    ///
    /// Running it again right after is a no-op.
    ///
    /// # Errors
    ///
    /// - `OfflineError::MigrationFailed` if a step fails; its app keeps the
    ///   previous stored version
    /// - `OfflineError::Programming` if an app ends below its
    ///   `compatible_since` version
    pub fn migrate(&self, store: &mut CacheStore) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let mut stored = self.stored_versions(store)?;

        for (app, info) in self.manifest.apps() {
            if !stored.contains_key(app) {
                store.set_stored_model_version(app, info.version)?;
                stored.insert(app.to_string(), info.version);
                report.seeded.push(app.to_string());
            }
        }
        if !report.seeded.is_empty() {
            debug!(apps = ?report.seeded, "seeded model versions");
        }

        for migration in &self.migrations {
            let app = migration.app();
            let version = migration.version();
            let current = stored.get(app).copied().unwrap_or(0);
            if current >= version {
                continue;
            }

            info!(app, from = current, to = version, "running offline migration");
            migration
                .migrate(store)
                .map_err(|source| OfflineError::MigrationFailed {
                    app: app.to_string(),
                    version,
                    source: Box::new(source),
                })?;
            store.set_stored_model_version(app, version)?;
            info!(app, version, "offline migration finished");
            stored.insert(app.to_string(), version);
            report.applied.push(VersionChoice::new(app, version));
        }

        let stored = self.stored_versions(store)?;
        for (app, info) in self.manifest.apps() {
            let version = stored.get(app).copied().unwrap_or(0);
            if version < info.compatible_since {
                return Err(OfflineError::Programming(format!(
                    "Offline cache for {} is at version {} but this client needs at least {}; a migration step is missing",
                    app, version, info.compatible_since
                )));
            }
        }

        Ok(report)
    }

    /// Stored model versions of the manifest's apps. Other metadata keys
    /// belong to the host and are never decoded.
    fn stored_versions(&self, store: &CacheStore) -> Result<BTreeMap<String, u32>> {
        let mut versions = BTreeMap::new();
        for (app, _) in self.manifest.apps() {
            if let Some(version) = store.stored_model_version(app)? {
                versions.insert(app.to_string(), version);
            }
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::crypto::DatabaseKey;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    struct Counting {
        app: &'static str,
        version: u32,
        runs: Arc<AtomicUsize>,
    }

    impl OfflineMigration for Counting {
        fn app(&self) -> &str {
            self.app
        }

        fn version(&self) -> u32 {
            self.version
        }

        fn migrate(&self, _store: &mut CacheStore) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl OfflineMigration for Failing {
        fn app(&self) -> &str {
            "mail"
        }

        fn version(&self) -> u32 {
            3
        }

        fn migrate(&self, _store: &mut CacheStore) -> Result<()> {
            Err(OfflineError::InvalidInput("unexpected payload".to_string()))
        }
    }

    fn open_store() -> (TempDir, CacheStore) {
        let dir = tempdir().unwrap();
        let store = CacheStore::open(
            &dir.path().join("offline.db"),
            &DatabaseKey::from_bytes([5; 32]),
            &CacheOptions::default(),
        )
        .unwrap();
        (dir, store)
    }

    fn manifest() -> ModelManifest {
        ModelManifest::new()
            .with_app("mail", ModelInfo::new(3, 2))
            .with_app("sys", ModelInfo::new(1, 1))
            .requiring_migration("mail", 2)
            .requiring_migration("mail", 3)
    }

    fn counting(app: &'static str, version: u32, runs: &Arc<AtomicUsize>) -> Box<dyn OfflineMigration> {
        Box::new(Counting {
            app,
            version,
            runs: Arc::clone(runs),
        })
    }

    #[test]
    fn test_fresh_cache_is_seeded_without_running_steps() {
        let (_dir, mut store) = open_store();
        let runs = Arc::new(AtomicUsize::new(0));
        let migrator = Migrator::new(
            manifest(),
            vec![counting("mail", 2, &runs), counting("mail", 3, &runs)],
        )
        .unwrap();

        let report = migrator.migrate(&mut store).unwrap();

        assert_eq!(report.seeded, vec!["mail", "sys"]);
        assert!(report.applied.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(store.stored_model_version("mail").unwrap(), Some(3));
    }

    #[test]
    fn test_stale_cache_runs_pending_steps_once() {
        let (_dir, mut store) = open_store();
        store.set_stored_model_version("mail", 1).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let migrator = Migrator::new(
            manifest(),
            vec![counting("mail", 3, &runs), counting("mail", 2, &runs)],
        )
        .unwrap();

        let report = migrator.migrate(&mut store).unwrap();
        assert_eq!(
            report.applied,
            vec![VersionChoice::new("mail", 2), VersionChoice::new("mail", 3)]
        );
        assert_eq!(store.stored_model_version("mail").unwrap(), Some(3));

        let again = migrator.migrate(&mut store).unwrap();
        assert!(again.applied.is_empty());
        assert!(again.seeded.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_step_is_programming_error() {
        let (_dir, mut store) = open_store();
        store.set_stored_model_version("mail", 1).unwrap();
        let migrator = Migrator::new(manifest(), Vec::new()).unwrap();

        let result = migrator.migrate(&mut store);
        assert!(matches!(result, Err(OfflineError::Programming(_))));
    }

    #[test]
    fn test_failed_step_does_not_advance_version() {
        let (_dir, mut store) = open_store();
        store.set_stored_model_version("mail", 2).unwrap();
        let migrator = Migrator::new(manifest(), vec![Box::new(Failing)]).unwrap();

        let result = migrator.migrate(&mut store);
        match result {
            Err(OfflineError::MigrationFailed { app, version, .. }) => {
                assert_eq!(app, "mail");
                assert_eq!(version, 3);
            }
            other => panic!("expected MigrationFailed, got {:?}", other.map(|_| ())),
        }
        assert_eq!(store.stored_model_version("mail").unwrap(), Some(2));
    }

    #[test]
    fn test_unrelated_version_metadata_is_ignored() {
        let (_dir, mut store) = open_store();
        store.set_metadata("client-version", b"3.98.1").unwrap();
        store.set_metadata("-version", b"garbage").unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let migrator = Migrator::new(
            manifest(),
            vec![counting("mail", 2, &runs), counting("mail", 3, &runs)],
        )
        .unwrap();

        let report = migrator.migrate(&mut store).unwrap();
        assert_eq!(report.seeded, vec!["mail", "sys"]);
        assert_eq!(
            store.get_metadata("client-version").unwrap(),
            Some(b"3.98.1".to_vec())
        );
        assert!(migrator.migrate(&mut store).unwrap().seeded.is_empty());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let runs = Arc::new(AtomicUsize::new(0));
        let result = Migrator::new(
            manifest(),
            vec![counting("mail", 2, &runs), counting("mail", 2, &runs)],
        );
        assert!(matches!(result, Err(OfflineError::Programming(_))));
    }

    #[test]
    fn test_unknown_app_rejected() {
        let runs = Arc::new(AtomicUsize::new(0));
        let result = Migrator::new(manifest(), vec![counting("calendar", 1, &runs)]);
        assert!(matches!(result, Err(OfflineError::Programming(_))));
    }

    #[test]
    fn test_completeness_report() {
        let runs = Arc::new(AtomicUsize::new(0));
        let migrations = vec![
            counting("mail", 2, &runs),
            counting("mail", 4, &runs),
            counting("mail", 4, &runs),
        ];
        let report = check_migration_completeness(&manifest(), &migrations);

        assert_eq!(report.missing, vec![VersionChoice::new("mail", 3)]);
        assert_eq!(report.unused, vec![VersionChoice::new("mail", 4)]);
        assert_eq!(report.duplicated, vec![VersionChoice::new("mail", 4)]);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_registered_migrations_match_current_manifest() {
        let migrator = Migrator::with_registered_migrations().unwrap();
        let report = migrator.completeness();
        assert!(report.is_complete(), "{:?}", report);
    }
}
