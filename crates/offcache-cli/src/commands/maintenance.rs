use std::io::IsTerminal;
use std::path::Path;

use chrono::{Duration, Utc};
use offcache_core::migration::{
    check_migration_completeness, registered_migrations, CompletenessReport, SchemaHistory,
};
use offcache_core::{Migrator, ModelManifest};

use crate::app::{open_or_recreate_store, open_store};
use crate::cli::Cli;
use crate::output::{display_value, metadata_json, simple_table};

pub fn handle_migrate(cli: &Cli) -> anyhow::Result<()> {
    let (mut store, _config) = open_store(cli)?;
    let report = Migrator::with_registered_migrations()?.migrate(&mut store)?;
    store.close()?;

    if !cli.quiet {
        if !report.seeded.is_empty() {
            println!("Recorded model versions for: {}", report.seeded.join(", "));
        }
        if report.applied.is_empty() {
            println!("Cache is up to date.");
        } else {
            for step in &report.applied {
                println!("Applied {}", step);
            }
        }
    }
    Ok(())
}

pub fn handle_check(cli: &Cli) -> anyhow::Result<()> {
    let (store, _config) = open_store(cli)?;
    match store.check_integrity() {
        Ok(()) => {
            if !cli.quiet {
                println!("Integrity check: OK");
            }
        }
        Err(err) => {
            eprintln!("Integrity check: FAILED");
            eprintln!("- error: {}", err);
            return Err(err.into());
        }
    }
    Ok(())
}

pub fn handle_compact(cli: &Cli, force: bool) -> anyhow::Result<()> {
    let (mut store, config) = open_store(cli)?;
    let interval = if force {
        Duration::zero()
    } else {
        Duration::days(i64::from(config.cache.compaction_interval_days))
    };

    let compacted = store.compact_if_due(Utc::now(), interval)?;
    if !cli.quiet {
        if compacted {
            println!("Compacted {}", store.path().display());
        } else {
            let last = store
                .last_compaction_time()?
                .map(|time| time.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!("Compaction not due (last: {}). Use --force to run anyway.", last);
        }
    }
    store.close()?;
    Ok(())
}

pub fn handle_purge(cli: &Cli, yes: bool) -> anyhow::Result<()> {
    if !yes {
        if !std::io::stdin().is_terminal() {
            return Err(anyhow::anyhow!(
                "Refusing to purge without confirmation. Pass --yes."
            ));
        }
        let proceed = dialoguer::Confirm::new()
            .with_prompt("Delete all cached data? The client will re-sync from the server.")
            .default(false)
            .interact()?;
        if !proceed {
            return Err(anyhow::anyhow!("Purge cancelled"));
        }
    }

    let (mut store, _config, recreated) = open_or_recreate_store(cli)?;
    if !recreated {
        store.purge()?;
    }
    // Purge also dropped the version entries; record the current ones again.
    Migrator::with_registered_migrations()?.migrate(&mut store)?;
    store.close()?;

    if !cli.quiet {
        if recreated {
            println!("Replaced unreadable cache at {}", store.path().display());
        } else {
            println!("Purged cache at {}", store.path().display());
        }
    }
    Ok(())
}

pub fn handle_info(cli: &Cli, json: bool) -> anyhow::Result<()> {
    let (store, _config) = open_store(cli)?;
    let cipher = store.cipher_info()?;
    let manifest = ModelManifest::current();

    let mut models = Vec::new();
    for (app, info) in manifest.apps() {
        models.push((app.to_string(), store.stored_model_version(app)?, *info));
    }
    let last_update = store.last_update_time()?;
    let last_compaction = store.last_compaction_time()?;

    if json {
        let value = serde_json::json!({
            "path": store.path().display().to_string(),
            "cipher": {
                "version": cipher.version,
                "provider": cipher.provider,
                "provider_version": cipher.provider_version,
                "settings": cipher.settings,
            },
            "models": models.iter().map(|(app, stored, info)| serde_json::json!({
                "app": app,
                "stored": stored,
                "current": info.version,
                "compatible_since": info.compatible_since,
            })).collect::<Vec<_>>(),
            "last_update_time": last_update.map(|t| t.to_rfc3339()),
            "last_compaction_time": last_compaction.map(|t| t.to_rfc3339()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let or_unknown = |value: Option<String>| value.unwrap_or_else(|| "unknown".to_string());
    println!("Cache: {}", store.path().display());
    println!("SQLCipher: {}", or_unknown(cipher.version));
    println!(
        "Provider: {} {}",
        or_unknown(cipher.provider),
        cipher.provider_version.unwrap_or_default()
    );
    for setting in &cipher.settings {
        println!("  {}", setting);
    }
    println!(
        "Last update: {}",
        or_unknown(last_update.map(|t| t.to_rfc3339()))
    );
    println!(
        "Last compaction: {}",
        last_compaction
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    println!();

    let rows: Vec<Vec<String>> = models
        .iter()
        .map(|(app, stored, info)| {
            vec![
                app.clone(),
                stored.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
                info.version.to_string(),
                info.compatible_since.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        simple_table(&["APP", "STORED", "CURRENT", "COMPATIBLE SINCE"], &rows)
    );
    Ok(())
}

pub fn handle_meta(cli: &Cli, json: bool) -> anyhow::Result<()> {
    let (store, _config) = open_store(cli)?;
    let metadata = store.dump_all_metadata()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata_json(&metadata))?);
        return Ok(());
    }
    if metadata.is_empty() {
        if !cli.quiet {
            println!("No metadata.");
        }
        return Ok(());
    }

    let rows: Vec<Vec<String>> = metadata
        .iter()
        .map(|(key, value)| vec![key.clone(), display_value(value)])
        .collect();
    println!("{}", simple_table(&["KEY", "VALUE"], &rows));
    Ok(())
}

pub fn handle_verify_migrations(cli: &Cli, schemas: Option<&str>) -> anyhow::Result<()> {
    let mut manifest = ModelManifest::current();
    if let Some(dir) = schemas {
        let histories = read_schema_histories(Path::new(dir))?;
        manifest = manifest.with_schema_histories(&histories);
    }

    let report = check_migration_completeness(&manifest, &registered_migrations());
    if report.is_complete() {
        if !cli.quiet {
            println!(
                "All {} required migrations are registered.",
                manifest.requires_migration().count()
            );
        }
        return Ok(());
    }

    print_completeness_problems(&report);
    Err(anyhow::anyhow!("Offline migrations are incomplete"))
}

fn print_completeness_problems(report: &CompletenessReport) {
    let sections = [
        ("Missing offline migrations", &report.missing),
        ("Registered but not required", &report.unused),
        ("Registered more than once", &report.duplicated),
    ];
    for (title, entries) in sections {
        if entries.is_empty() {
            continue;
        }
        eprintln!("{}:", title);
        for entry in entries {
            eprintln!("- {}", entry);
        }
    }
}

fn read_schema_histories(dir: &Path) -> anyhow::Result<Vec<SchemaHistory>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Failed to read schema directory {}: {}", dir.display(), e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut histories = Vec::new();
    for path in paths {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let history = SchemaHistory::from_json(&contents)
            .map_err(|e| anyhow::anyhow!("Invalid schema history {}: {}", path.display(), e))?;
        histories.push(history);
    }
    Ok(histories)
}
