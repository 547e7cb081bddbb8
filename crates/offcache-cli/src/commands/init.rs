use std::io::IsTerminal;
use std::path::PathBuf;

use dialoguer::Select;
use offcache_core::{CacheStore, Migrator};

use crate::app::resolve_config_path;
use crate::cli::{Cli, InitArgs, KeySourceArg};
use crate::config::{
    default_cache_path, default_keyfile_path, write_config, KeySource, OffcacheConfig,
};
use crate::security::{generate_key, keychain_set, write_keyfile};

impl From<KeySourceArg> for KeySource {
    fn from(value: KeySourceArg) -> Self {
        match value {
            KeySourceArg::Keychain => KeySource::Keychain,
            KeySourceArg::Keyfile => KeySource::Keyfile,
        }
    }
}

fn prompt_key_source() -> anyhow::Result<KeySource> {
    let choice = Select::new()
        .with_prompt("Where should the cache key be stored?")
        .items(&["Device keyfile (0600)", "OS keychain"])
        .default(0)
        .interact()?;
    Ok(if choice == 0 {
        KeySource::Keyfile
    } else {
        KeySource::Keychain
    })
}

pub fn handle_init(cli: &Cli, args: &InitArgs) -> anyhow::Result<()> {
    let config_path = resolve_config_path()?;
    if config_path.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Config already exists at {}. Use --force to replace it.",
            config_path.display()
        ));
    }

    let cache_path = match args.path.as_deref().or(cli.cache.as_deref()) {
        Some(path) => PathBuf::from(path),
        None => default_cache_path()?,
    };
    if cache_path.exists() {
        if !args.force {
            return Err(anyhow::anyhow!(
                "Cache already exists at {}. Use --force to replace it.",
                cache_path.display()
            ));
        }
        // The old file is unreadable with the new key.
        std::fs::remove_file(&cache_path).map_err(|e| {
            anyhow::anyhow!("Failed to remove old cache {}: {}", cache_path.display(), e)
        })?;
    }

    let interactive = std::io::stdin().is_terminal() && !args.no_input;
    let source = match args.key_source {
        Some(source) => source.into(),
        None if interactive => prompt_key_source()?,
        None => KeySource::Keyfile,
    };

    let key = generate_key()?;
    let keyfile_path = match source {
        KeySource::Keyfile => {
            let path = match args.keyfile_path.as_deref() {
                Some(path) => PathBuf::from(path),
                None => default_keyfile_path()?,
            };
            write_keyfile(&path, &key, args.force)?;
            Some(path)
        }
        KeySource::Keychain => None,
    };
    let config = OffcacheConfig::new(cache_path.clone(), source, keyfile_path, args.account.clone());
    if source == KeySource::Keychain {
        keychain_set(config.keychain_account(), &key)?;
    }

    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!("Failed to create cache directory {}: {}", parent.display(), e)
        })?;
    }
    let mut store = CacheStore::open(&cache_path, &key, &config.cache_options())?;
    let report = Migrator::with_registered_migrations()?.migrate(&mut store)?;
    store.close()?;

    write_config(&config_path, &config)?;

    if !cli.quiet {
        println!("Created encrypted cache at {}", cache_path.display());
        match &config.key.keyfile {
            Some(path) => println!("Key stored in keyfile {}", path),
            None => println!(
                "Key stored in the OS keychain (account '{}')",
                config.keychain_account()
            ),
        }
        println!("Model versions recorded for: {}", report.seeded.join(", "));
        println!("Config written to {}", config_path.display());
    }
    Ok(())
}
