//! Process-wide `tracing` setup for the CLI.
//!
//! Human-readable lines go to stderr. Interactive runs also append JSON
//! records to `<config dir>/starmap/logs/starmap.log`.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;
use tracing::{Subscriber, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::{LocalTime, UtcTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::config_directory;

const LOG_FILE_NAME: &str = "starmap.log";

/// Beats `RUST_LOG` when set and non-blank.
const FILTER_ENV: &str = "STARMAP_LOG";

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub enum LoggingDestination {
    FileAndStderr,
    /// No log file. Used by tests.
    StderrOnly,
}

/// Default level used when neither `STARMAP_LOG` nor `RUST_LOG` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// `--verbose` beats `--quiet` when both are given.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else if quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    fn level(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot create log directory: {0}")]
    Io(#[from] io::Error),
    #[error("bad log filter directive: {0}")]
    Filter(#[from] ParseError),
    #[error("another tracing subscriber is already installed: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Holds the file writer's flush guard until the process exits.
#[derive(Debug)]
struct ActiveLogging {
    _flush: Option<WorkerGuard>,
    file: Option<PathBuf>,
}

static ACTIVE: OnceLock<ActiveLogging> = OnceLock::new();

/// Installs the global subscriber and returns the JSON log file, if any.
///
/// Only the first call configures anything. Later calls report the file
/// chosen by the first.
pub fn init_logging(
    destination: LoggingDestination,
    verbosity: Verbosity,
) -> Result<Option<&'static Path>, LoggingError> {
    if ACTIVE.get().is_none() {
        let active = install(destination, verbosity)?;
        let _ = ACTIVE.set(active);
    }
    Ok(ACTIVE.get().and_then(|active| active.file.as_deref()))
}

fn install(
    destination: LoggingDestination,
    verbosity: Verbosity,
) -> Result<ActiveLogging, LoggingError> {
    let (file_layer, flush, file) = match destination {
        LoggingDestination::FileAndStderr => {
            let dir = config_directory().join("logs");
            let (layer, guard) = json_file_layer(&dir)?;
            (Some(layer), Some(guard), Some(dir.join(LOG_FILE_NAME)))
        }
        LoggingDestination::StderrOnly => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter_for(verbosity)?)
        .with(file_layer)
        .with(stderr_layer())
        .try_init()?;

    if let Some(path) = &file {
        info!(path = %path.display(), "Writing JSON logs");
    }
    Ok(ActiveLogging {
        _flush: flush,
        file,
    })
}

fn json_file_layer<S>(dir: &Path) -> io::Result<(BoxedLayer<S>, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let format = tracing_subscriber::fmt::format()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_file(true)
        .with_line_number(true);
    let layer = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(writer)
        .with_ansi(false)
        .boxed();
    Ok((layer, guard))
}

fn stderr_layer<S>() -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let format = tracing_subscriber::fmt::format()
        .with_timer(LocalTime::rfc_3339())
        .with_target(false)
        .with_ansi(false);
    tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(io::stderr)
        .with_ansi(false)
        .boxed()
}

fn filter_for(verbosity: Verbosity) -> Result<EnvFilter, ParseError> {
    match env::var(FILTER_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(verbosity.level())),
    }
}
