use anyhow::Result;
use clap::Parser;
use starmap_cli::cli_args::{Cli, Command};
use starmap_cli::commands;
use starmap_core::{
    LoggingDestination, Verbosity, config_path, init_logging, load_config, load_config_from,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = dispatch(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let verbosity = Verbosity::from_flags(cli.global.verbose, cli.global.quiet);
    match init_logging(LoggingDestination::FileAndStderr, verbosity) {
        Ok(Some(path)) => debug!(path = %path.display(), "Logging to file"),
        Ok(None) => {}
        Err(err) => eprintln!("Warning: structured logging unavailable: {err}"),
    }

    let load = match cli.global.config.as_deref() {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    for warning in &load.warnings {
        warn!("{warning}");
    }
    let mut config = load.config;
    config.apply_env_overrides(|name| std::env::var(name).ok())?;

    match cli.command {
        Command::Sync(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling sync");
                    on_signal.cancel();
                }
            });
            commands::sync::run(&args, &config, cancel).await
        }
        Command::List(command) => commands::list::run(&command, &config),
        Command::InitConfig(args) => {
            let target = cli.global.config.unwrap_or_else(config_path);
            commands::config::init(&args, &target)
        }
    }
}
