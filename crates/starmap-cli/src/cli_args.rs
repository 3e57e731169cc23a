use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use starmap_core::config::expand_path;
use starmap_core::{FileConfig, SyncOptions};

/// Top-level CLI entrypoint.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "starmap",
    version,
    about = "Keep an AI model catalog in sync with provider APIs",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags accepted by every subcommand.
#[derive(Debug, Clone, Args, Default)]
pub struct GlobalArgs {
    /// Log debug output to stderr.
    #[arg(short, long, global = true, action = ArgAction::SetTrue, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors to stderr.
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub quiet: bool,

    /// Read configuration from this file instead of the default location.
    #[arg(long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
}

/// Supported subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Fetch live model lists and reconcile them with the catalog.
    Sync(SyncArgs),
    /// Show what the catalog currently holds.
    #[command(subcommand)]
    List(ListCommand),
    /// Write a default config file to `--config` or the standard location.
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Clone, Args, Default)]
pub struct InitConfigArgs {
    /// Replace an existing config file.
    #[arg(long, action = ArgAction::SetTrue)]
    pub force: bool,
}

#[derive(Debug, Clone, Args, Default)]
pub struct SyncArgs {
    /// Sync a single provider by ID.
    #[arg(short, long, value_name = "ID")]
    pub provider: Option<String>,

    /// Show what would change without writing files.
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Delete existing model files and rebuild them from the live listing.
    #[arg(long, action = ArgAction::SetTrue)]
    pub fresh: bool,

    /// Apply changes without asking.
    #[arg(short = 'y', long, action = ArgAction::SetTrue)]
    pub auto_approve: bool,

    /// Catalog directory to read and write.
    #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub output: Option<String>,

    /// Per-provider fetch timeout in seconds.
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Maximum number of providers fetched at once.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: Option<u32>,

    /// Skip models.dev enrichment.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_enrich: bool,

    /// Remove the local models.dev cache once the run finishes.
    #[arg(long = "cleanup-models-dev", action = ArgAction::SetTrue)]
    pub cleanup_models_dev: bool,

    /// Print YAML diffs of updated models.
    #[arg(long, action = ArgAction::SetTrue)]
    pub show_diff: bool,
}

impl SyncArgs {
    /// Layers these flags over the configured defaults.
    pub fn to_options(&self, config: &FileConfig) -> SyncOptions {
        let mut options = SyncOptions::from_config(config);
        options.provider = self
            .provider
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        options.dry_run = self.dry_run;
        options.fresh = self.fresh;
        options.auto_approve = self.auto_approve;
        if let Some(dir) = self.output.as_deref() {
            options.output_dir = expand_path(dir);
        }
        if let Some(secs) = self.timeout {
            options.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = self.concurrency {
            options.concurrency = limit as usize;
        }
        if self.no_enrich {
            options.enrich = false;
        }
        options.cleanup_enrichment = self.cleanup_models_dev;
        options
    }
}

/// Listing subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum ListCommand {
    /// Providers, whether they have a listing client, and credential status.
    Providers(ListArgs),
    /// Models, optionally limited to one provider.
    Models(ListArgs),
    /// Authors and how many catalog models they are credited with.
    Authors(ListArgs),
}

impl ListCommand {
    pub fn args(&self) -> &ListArgs {
        match self {
            ListCommand::Providers(args)
            | ListCommand::Models(args)
            | ListCommand::Authors(args) => args,
        }
    }
}

#[derive(Debug, Clone, Args, Default)]
pub struct ListArgs {
    /// Limit the listing to one provider.
    #[arg(short, long, value_name = "ID")]
    pub provider: Option<String>,

    /// Catalog directory to read.
    #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub output: Option<String>,
}

impl ListArgs {
    pub fn catalog_dir(&self, config: &FileConfig) -> PathBuf {
        self.output
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| config.sync.output_dir())
    }
}
