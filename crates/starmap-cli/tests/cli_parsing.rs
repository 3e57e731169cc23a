use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use starmap_cli::cli_args::{Cli, Command, InitConfigArgs, ListCommand};
use starmap_core::FileConfig;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("starmap").chain(args.iter().copied()))
        .unwrap_or_else(|err| panic!("failed to parse {args:?}: {err}"))
}

fn sync_args(cli: Cli) -> starmap_cli::cli_args::SyncArgs {
    match cli.command {
        Command::Sync(args) => args,
        other => panic!("expected sync, got {other:?}"),
    }
}

#[test]
fn sync_defaults_come_from_config() {
    let mut config = FileConfig::default();
    config.sync.output_dir = Some("/tmp/starmap-catalog".to_string());
    config.sync.concurrency = 3;
    config.sync.fetch_timeout_secs = 12;

    let options = sync_args(parse(&["sync"])).to_options(&config);
    assert_eq!(options.output_dir, PathBuf::from("/tmp/starmap-catalog"));
    assert_eq!(options.concurrency, 3);
    assert_eq!(options.fetch_timeout, Duration::from_secs(12));
    assert!(options.provider.is_none());
    assert!(!options.dry_run && !options.fresh && !options.auto_approve);
    assert!(options.enrich);
    assert!(!options.cleanup_enrichment);
}

#[test]
fn sync_flags_override_config() {
    let cli = parse(&[
        "sync",
        "-p",
        "groq",
        "--dry-run",
        "--fresh",
        "-y",
        "-o",
        "/srv/catalog",
        "--timeout",
        "5",
        "--concurrency",
        "2",
        "--no-enrich",
        "--cleanup-models-dev",
        "--show-diff",
    ]);
    let args = sync_args(cli);
    assert!(args.show_diff);

    let options = args.to_options(&FileConfig::default());
    assert_eq!(options.provider.as_deref(), Some("groq"));
    assert!(options.dry_run && options.fresh && options.auto_approve);
    assert_eq!(options.output_dir, PathBuf::from("/srv/catalog"));
    assert_eq!(options.fetch_timeout, Duration::from_secs(5));
    assert_eq!(options.concurrency, 2);
    assert!(!options.enrich);
    assert!(options.cleanup_enrichment);
}

#[test]
fn zero_limits_are_rejected() {
    assert!(Cli::try_parse_from(["starmap", "sync", "--concurrency", "0"]).is_err());
    assert!(Cli::try_parse_from(["starmap", "sync", "--timeout", "0"]).is_err());
}

#[test]
fn blank_provider_means_all() {
    let options =
        sync_args(parse(&["sync", "--provider", "  "])).to_options(&FileConfig::default());
    assert!(options.provider.is_none());
}

#[test]
fn global_flags_work_after_subcommand() {
    let cli = parse(&["sync", "-v", "--config", "/etc/starmap.toml"]);
    assert!(cli.global.verbose);
    assert_eq!(cli.global.config, Some(PathBuf::from("/etc/starmap.toml")));

    assert!(Cli::try_parse_from(["starmap", "-v", "-q", "sync"]).is_err());
}

#[test]
fn list_subcommands_parse() {
    let cli = parse(&["list", "models", "-p", "openai"]);
    let Command::List(ListCommand::Models(args)) = cli.command else {
        panic!("expected list models");
    };
    assert_eq!(args.provider.as_deref(), Some("openai"));

    let cli = parse(&["list", "providers", "-o", "/srv/catalog"]);
    let Command::List(command) = cli.command else {
        panic!("expected list");
    };
    assert!(matches!(command, ListCommand::Providers(_)));
    assert_eq!(
        command.args().catalog_dir(&FileConfig::default()),
        PathBuf::from("/srv/catalog")
    );

    assert!(Cli::try_parse_from(["starmap", "list"]).is_err());
    assert!(Cli::try_parse_from(["starmap"]).is_err());
}

#[test]
fn init_config_takes_force_flag() {
    let Command::InitConfig(InitConfigArgs { force }) = parse(&["init-config"]).command else {
        panic!("expected init-config");
    };
    assert!(!force);

    let cli = parse(&["init-config", "--force", "--config", "/tmp/starmap.toml"]);
    assert!(matches!(cli.command, Command::InitConfig(InitConfigArgs { force: true })));
    assert_eq!(cli.global.config, Some(PathBuf::from("/tmp/starmap.toml")));
}
