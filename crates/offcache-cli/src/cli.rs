use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use offcache_core::VERSION;

/// Offcache - maintenance tool for the encrypted offline mail cache
#[derive(Parser)]
#[command(name = "offcache")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the cache file
    #[arg(short, long, global = true, env = "OFFCACHE_PATH")]
    pub cache: Option<String>,

    #[command(subcommand)]
    pub command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Where the cache key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeySourceArg {
    Keychain,
    Keyfile,
}

/// Arguments for the `init` command
#[derive(Args)]
pub struct InitArgs {
    /// Path where the cache will be created
    #[arg(value_name = "PATH")]
    pub path: Option<String>,

    /// Key storage (prompted when interactive)
    #[arg(long, value_enum)]
    pub key_source: Option<KeySourceArg>,

    /// Keyfile path override
    #[arg(long)]
    pub keyfile_path: Option<String>,

    /// Keychain account name
    #[arg(long)]
    pub account: Option<String>,

    /// Overwrite an existing configuration
    #[arg(long)]
    pub force: bool,

    /// Disable interactive prompts
    #[arg(long)]
    pub no_input: bool,
}

/// Arguments for the `compact` command
#[derive(Args)]
pub struct CompactArgs {
    /// Compact even if the last compaction is recent
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `purge` command
#[derive(Args)]
pub struct PurgeArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the `meta` command
#[derive(Args)]
pub struct MetaArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Args)]
pub struct InfoArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `verify-migrations` command
#[derive(Args)]
pub struct VerifyMigrationsArgs {
    /// Directory of schema history files (`*.json`)
    #[arg(long, value_name = "DIR")]
    pub schemas: Option<String>,
}

/// Arguments for the `completions` command
#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_name = "SHELL")]
    pub shell: Shell,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a key, an empty cache and the configuration
    Init(InitArgs),

    /// Run pending offline migrations
    Migrate,

    /// Verify every page of the cache file
    Check,

    /// Reclaim free space in the cache file
    Compact(CompactArgs),

    /// Delete all cached data, keeping the schema
    Purge(PurgeArgs),

    /// Show cipher configuration and model versions
    Info(InfoArgs),

    /// Dump metadata entries
    Meta(MetaArgs),

    /// Cross-check registered migrations against the schema history
    VerifyMigrations(VerifyMigrationsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
