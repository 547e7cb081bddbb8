use std::path::{Path, PathBuf};

use offcache_core::CacheOptions;
use serde::{Deserialize, Serialize};

pub const DEFAULT_KEYCHAIN_ACCOUNT: &str = "default";

#[derive(Debug, Serialize, Deserialize)]
pub struct OffcacheConfig {
    pub cache: CacheSection,
    pub key: KeySection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheSection {
    pub path: String,
    #[serde(default = "default_verify_integrity")]
    pub verify_integrity: bool,
    #[serde(default = "default_compaction_interval_days")]
    pub compaction_interval_days: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeySection {
    pub source: KeySource,
    pub keyfile: Option<String>,
    pub account: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    Keychain,
    Keyfile,
}

fn default_verify_integrity() -> bool {
    CacheOptions::default().verify_integrity
}

fn default_compaction_interval_days() -> u32 {
    CacheOptions::default().compaction_interval_days
}

impl OffcacheConfig {
    pub fn new(
        cache_path: PathBuf,
        source: KeySource,
        keyfile_path: Option<PathBuf>,
        account: Option<String>,
    ) -> Self {
        let defaults = CacheOptions::default();
        Self {
            cache: CacheSection {
                path: cache_path.to_string_lossy().to_string(),
                verify_integrity: defaults.verify_integrity,
                compaction_interval_days: defaults.compaction_interval_days,
            },
            key: KeySection {
                source,
                keyfile: keyfile_path.map(|path| path.to_string_lossy().to_string()),
                account,
            },
        }
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            verify_integrity: self.cache.verify_integrity,
            compaction_interval_days: self.cache.compaction_interval_days,
        }
    }

    pub fn keychain_account(&self) -> &str {
        self.key
            .account
            .as_deref()
            .unwrap_or(DEFAULT_KEYCHAIN_ACCOUNT)
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_cache_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("offline.db"))
}

pub fn default_keyfile_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("offline.key"))
}

pub fn read_config(path: &Path) -> anyhow::Result<OffcacheConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

pub fn write_config(path: &Path, config: &OffcacheConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create config directory {}: {}",
                parent.display(),
                e
            )
        })?;
    }
    let contents =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {}", e))?;
    std::fs::write(path, contents)
        .map_err(|e| anyhow::anyhow!("Failed to write config {}: {}", path.display(), e))?;
    Ok(())
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("offcache"));
        }
    }
    Ok(home_dir()?.join(".config").join("offcache"))
}

pub fn xdg_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("offcache"));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join("offcache"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = OffcacheConfig::new(
            PathBuf::from("/tmp/offline.db"),
            KeySource::Keyfile,
            Some(PathBuf::from("/tmp/offline.key")),
            None,
        );
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("source = \"keyfile\""));

        let parsed: OffcacheConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.key.source, KeySource::Keyfile);
        assert_eq!(parsed.cache.path, "/tmp/offline.db");
        assert!(parsed.cache_options().verify_integrity);
    }

    #[test]
    fn test_cache_options_default_when_omitted() {
        let parsed: OffcacheConfig = toml::from_str(
            "[cache]\npath = \"/tmp/c.db\"\n\n[key]\nsource = \"keychain\"\n",
        )
        .unwrap();
        assert_eq!(parsed.cache_options(), CacheOptions::default());
        assert_eq!(parsed.keychain_account(), DEFAULT_KEYCHAIN_ACCOUNT);
    }
}
