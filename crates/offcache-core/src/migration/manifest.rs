//! Model versions known to this client and the versions that need an
//! offline migration.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::OfflineMigration;

/// A `(app, version)` pair, e.g. `tutanota-v65`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionChoice {
    pub app: String,
    pub version: u32,
}

impl VersionChoice {
    pub fn new(app: impl Into<String>, version: u32) -> Self {
        Self {
            app: app.into(),
            version,
        }
    }
}

impl fmt::Display for VersionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-v{}", self.app, self.version)
    }
}

/// Model version of one app namespace as compiled into the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Current model version
    pub version: u32,

    /// Oldest stored version this client can still read
    pub compatible_since: u32,
}

impl ModelInfo {
    pub const fn new(version: u32, compatible_since: u32) -> Self {
        Self {
            version,
            compatible_since,
        }
    }
}

/// Schema history of one app, as published with the remote model.
///
/// Every listed version is an incompatible model change and needs an
/// offline migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaHistory {
    pub app: String,
    pub versions: Vec<SchemaVersion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub version: u32,
}

impl SchemaHistory {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// App namespaces with their model versions, plus every `(app, version)`
/// requiring a migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelManifest {
    apps: BTreeMap<String, ModelInfo>,
    requires_migration: BTreeSet<VersionChoice>,
}

const CURRENT_MODELS: &[(&str, ModelInfo)] = &[
    ("accounting", ModelInfo::new(5, 5)),
    ("base", ModelInfo::new(1, 1)),
    ("gossip", ModelInfo::new(1, 1)),
    ("monitor", ModelInfo::new(24, 24)),
    ("storage", ModelInfo::new(6, 6)),
    ("sys", ModelInfo::new(96, 96)),
    ("tutanota", ModelInfo::new(65, 65)),
    ("usage", ModelInfo::new(2, 2)),
];

const CURRENT_REQUIRES_MIGRATION: &[(&str, u32)] = &[
    ("sys", 79),
    ("sys", 96),
    ("tutanota", 62),
    ("tutanota", 65),
];

impl ModelManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// The models this client is built against.
    pub fn current() -> Self {
        let mut manifest = Self::new();
        for (app, info) in CURRENT_MODELS {
            manifest = manifest.with_app(*app, *info);
        }
        for (app, version) in CURRENT_REQUIRES_MIGRATION {
            manifest = manifest.requiring_migration(*app, *version);
        }
        manifest
    }

    pub fn with_app(mut self, app: impl Into<String>, info: ModelInfo) -> Self {
        self.apps.insert(app.into(), info);
        self
    }

    pub fn requiring_migration(mut self, app: impl Into<String>, version: u32) -> Self {
        self.requires_migration.insert(VersionChoice::new(app, version));
        self
    }

    /// Mark every version in `history` as requiring a migration.
    pub fn with_schema_history(mut self, history: &SchemaHistory) -> Self {
        for entry in &history.versions {
            self.requires_migration
                .insert(VersionChoice::new(history.app.clone(), entry.version));
        }
        self
    }

    /// Replace the "requires migration" list with the union of `histories`.
    pub fn with_schema_histories<'a>(
        mut self,
        histories: impl IntoIterator<Item = &'a SchemaHistory>,
    ) -> Self {
        self.requires_migration.clear();
        for history in histories {
            self = self.with_schema_history(history);
        }
        self
    }

    pub fn apps(&self) -> impl Iterator<Item = (&str, &ModelInfo)> {
        self.apps.iter().map(|(app, info)| (app.as_str(), info))
    }

    pub fn model_info(&self, app: &str) -> Option<&ModelInfo> {
        self.apps.get(app)
    }

    pub fn requires_migration(&self) -> impl Iterator<Item = &VersionChoice> {
        self.requires_migration.iter()
    }
}

/// Result of cross-checking registered migrations against a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletenessReport {
    /// Required by the manifest, no step registered
    pub missing: Vec<VersionChoice>,

    /// Registered, but the manifest does not require it
    pub unused: Vec<VersionChoice>,

    /// Registered more than once
    pub duplicated: Vec<VersionChoice>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.unused.is_empty() && self.duplicated.is_empty()
    }
}

/// Every required version must have exactly one step, every step must be required.
pub fn check_migration_completeness(
    manifest: &ModelManifest,
    migrations: &[Box<dyn OfflineMigration>],
) -> CompletenessReport {
    let mut registered = BTreeSet::new();
    let mut duplicated = BTreeSet::new();
    for migration in migrations {
        let choice = VersionChoice::new(migration.app(), migration.version());
        if !registered.insert(choice.clone()) {
            duplicated.insert(choice);
        }
    }

    CompletenessReport {
        missing: manifest
            .requires_migration
            .difference(&registered)
            .cloned()
            .collect(),
        unused: registered
            .difference(&manifest.requires_migration)
            .cloned()
            .collect(),
        duplicated: duplicated.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_manifest_knows_mail_apps() {
        let manifest = ModelManifest::current();
        assert_eq!(manifest.model_info("tutanota"), Some(&ModelInfo::new(65, 65)));
        assert!(manifest.model_info("sys").is_some());
        assert_eq!(manifest.requires_migration().count(), 4);
    }

    #[test]
    fn test_schema_history_parses() {
        let history =
            SchemaHistory::from_json(r#"{"app": "sys", "versions": [{"version": 79}, {"version": 96}]}"#)
                .unwrap();
        let manifest = ModelManifest::new().with_schema_history(&history);
        let required: Vec<String> = manifest.requires_migration().map(|v| v.to_string()).collect();
        assert_eq!(required, vec!["sys-v79", "sys-v96"]);
    }

    #[test]
    fn test_schema_history_rejects_bad_json() {
        assert!(SchemaHistory::from_json(r#"{"app": "sys"}"#).is_err());
    }

    #[test]
    fn test_version_choice_orders_by_app_then_version() {
        let mut choices = vec![
            VersionChoice::new("tutanota", 62),
            VersionChoice::new("sys", 96),
            VersionChoice::new("sys", 79),
        ];
        choices.sort();
        assert_eq!(
            choices,
            vec![
                VersionChoice::new("sys", 79),
                VersionChoice::new("sys", 96),
                VersionChoice::new("tutanota", 62),
            ]
        );
    }
}
