//! Offcache CLI - maintenance tool for the encrypted offline mail cache
//!
//! Opens a cache with the key from the OS keychain or a device keyfile and
//! runs migrations, integrity checks, compaction and inspection commands.

mod app;
mod cli;
mod commands;
mod config;
mod output;
mod security;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("OFFCACHE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init(args) => commands::init::handle_init(cli, args),
        Commands::Migrate => commands::maintenance::handle_migrate(cli),
        Commands::Check => commands::maintenance::handle_check(cli),
        Commands::Compact(args) => commands::maintenance::handle_compact(cli, args.force),
        Commands::Purge(args) => commands::maintenance::handle_purge(cli, args.yes),
        Commands::Info(args) => commands::maintenance::handle_info(cli, args.json),
        Commands::Meta(args) => commands::maintenance::handle_meta(cli, args.json),
        Commands::VerifyMigrations(args) => {
            commands::maintenance::handle_verify_migrations(cli, args.schemas.as_deref())
        }
        Commands::Completions(args) => commands::misc::handle_completions(args.shell),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            if let Some(hint) = app::hint_for(&err) {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
