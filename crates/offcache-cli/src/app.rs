use std::path::{Path, PathBuf};

use offcache_core::{CacheStore, DatabaseKey, OfflineError};
use tracing::{debug, warn};

use crate::cli::Cli;
use crate::config::{default_config_path, read_config, KeySource, OffcacheConfig};
use crate::security::{keychain_get, read_keyfile};

pub fn resolve_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("OFFCACHE_CONFIG") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    default_config_path()
}

pub fn load_config() -> anyhow::Result<OffcacheConfig> {
    let config_path = resolve_config_path()?;
    if !config_path.exists() {
        return Err(anyhow::anyhow!(missing_config_message(&config_path)));
    }
    read_config(&config_path)
}

/// `--cache` / `OFFCACHE_PATH` win over the configured path.
pub fn resolve_cache_path(cli: &Cli, config: &OffcacheConfig) -> PathBuf {
    match cli.cache.as_deref() {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(&config.cache.path),
    }
}

pub fn load_key(config: &OffcacheConfig) -> anyhow::Result<DatabaseKey> {
    match config.key.source {
        KeySource::Keyfile => {
            let path = config
                .key
                .keyfile
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Config selects a keyfile but [key] keyfile is not set"))?;
            read_keyfile(Path::new(path))
        }
        KeySource::Keychain => {
            let account = config.keychain_account();
            keychain_get(account)?.ok_or_else(|| {
                anyhow::anyhow!("No cache key in the OS keychain for account '{}'", account)
            })
        }
    }
}

/// Open the configured cache. The file must already exist.
pub fn open_store(cli: &Cli) -> anyhow::Result<(CacheStore, OffcacheConfig)> {
    let (config, path, key) = store_inputs(cli)?;
    debug!(path = %path.display(), source = ?config.key.source, "opening cache");
    let store = CacheStore::open(&path, &key, &config.cache_options())?;
    Ok((store, config))
}

/// Open the configured cache, replacing the file with an empty cache when
/// its contents can no longer be trusted (wrong key, failed integrity check).
///
/// Returns whether the file was replaced.
pub fn open_or_recreate_store(cli: &Cli) -> anyhow::Result<(CacheStore, OffcacheConfig, bool)> {
    let (config, path, key) = store_inputs(cli)?;
    let options = config.cache_options();
    match CacheStore::open(&path, &key, &options) {
        Ok(store) => Ok((store, config, false)),
        Err(err) if err.requires_resync() => {
            warn!(path = %path.display(), error = %err, "replacing unreadable cache");
            remove_cache_file(&path)?;
            let store = CacheStore::open(&path, &key, &options)?;
            Ok((store, config, true))
        }
        Err(err) => Err(err.into()),
    }
}

fn store_inputs(cli: &Cli) -> anyhow::Result<(OffcacheConfig, PathBuf, DatabaseKey)> {
    let config = load_config()?;
    let path = resolve_cache_path(cli, &config);
    if !path.exists() {
        return Err(anyhow::anyhow!(missing_cache_message(&path)));
    }
    let key = load_key(&config)?;
    Ok((config, path, key))
}

/// Remove a cache file and any SQLite side files next to it.
fn remove_cache_file(path: &Path) -> anyhow::Result<()> {
    std::fs::remove_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to remove {}: {}", path.display(), e))?;
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            std::fs::remove_file(&side)
                .map_err(|e| anyhow::anyhow!("Failed to remove {}: {}", side.display(), e))?;
        }
    }
    Ok(())
}

pub fn missing_cache_message(path: &Path) -> String {
    format!(
        "No cache found at {}. Run `offcache init` or pass --cache.",
        path.display()
    )
}

pub fn missing_config_message(config_path: &Path) -> String {
    format!(
        "No config found at {}. Run `offcache init` first.",
        config_path.display()
    )
}

/// Operator hint for a failed command, if the cause is known.
pub fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    let offline = err.downcast_ref::<OfflineError>()?;
    if offline.requires_resync() {
        return Some(
            "The offline cache can no longer be trusted. Run `offcache purge` to replace it with an empty cache and let the client re-sync.",
        );
    }
    match offline {
        OfflineError::StorageUnavailable(_) => {
            Some("Check that the cache directory exists and is writable.")
        }
        OfflineError::NoRange { .. } => Some("The list has not been fetched yet."),
        _ => None,
    }
}
