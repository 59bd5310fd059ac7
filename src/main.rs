//! CLI entry point for the v0-session tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use v0_session::auth::default_data_dir;
use v0_session::config::{CONFIG_FILE_NAME, ConfigError};
use v0_session::extract::ProfileRoots;
use v0_session::interaction::is_dumb_terminal;
use v0_session::{AuthStateStore, LoadedConfig, SessionManager, Settings, load_config};

mod cli;
mod commands;

use cli::{Args, Command};

const DIAGNOSTICS_LOG_FILE: &str = "diagnostics.log";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let data_dir = resolve_data_dir(&args);
    let loaded = match &data_dir {
        Ok(dir) => {
            let path = args
                .config
                .clone()
                .unwrap_or_else(|| dir.join(CONFIG_FILE_NAME));
            load_config(&path)
        }
        Err(_) => match &args.config {
            Some(path) => load_config(path),
            None => Ok(LoadedConfig::default()),
        },
    };

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let default_level = args.cli_log_level().unwrap_or_else(|| {
        loaded
            .as_ref()
            .ok()
            .and_then(|loaded| loaded.config.as_ref())
            .and_then(|config| config.verbosity)
            .map_or("info", |verbosity| verbosity.as_filter())
    });
    let _diagnostics_guard = init_tracing(default_level, data_dir.as_deref().ok());

    debug!(?args, "CLI arguments parsed");

    match run(args, data_dir, loaded).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    args: Args,
    data_dir: Result<PathBuf>,
    loaded: Result<LoadedConfig, ConfigError>,
) -> Result<()> {
    let loaded = loaded.context("Failed to load configuration")?;
    if loaded.config.is_some() {
        info!(path = %loaded.path.display(), "Loaded config file");
    }

    let mut settings = Settings::from_file_config(loaded.config.as_ref());
    if let Some(base_url) = &args.base_url {
        settings.base_url.clone_from(base_url);
    }

    match &args.command {
        Command::Login => {
            let manager = build_manager(data_dir, &settings)?;
            commands::run_login_command(&manager, args.quiet).await
        }
        Command::Logout => commands::run_logout_command(&build_manager(data_dir, &settings)?).await,
        Command::Status => commands::run_status_command(&build_manager(data_dir, &settings)?),
        Command::Cookies { header } => {
            commands::run_cookies_command(&build_manager(data_dir, &settings)?, *header)
        }
        Command::Import { file } => {
            let manager = build_manager(data_dir, &settings)?;
            commands::run_import_command(&manager, file.as_deref()).await
        }
        Command::Whoami => commands::run_whoami_command(&build_manager(data_dir, &settings)?).await,
        Command::Browsers => commands::run_browsers_command(&ProfileRoots::from_system()),
    }
}

fn build_manager(data_dir: Result<PathBuf>, settings: &Settings) -> Result<SessionManager> {
    let manager = SessionManager::builder(AuthStateStore::new(data_dir?))
        .settings(settings)
        .with_context(|| format!("Invalid base URL '{}'", settings.base_url))?
        .build();
    Ok(manager)
}

fn resolve_data_dir(args: &Args) -> Result<PathBuf> {
    match &args.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => default_data_dir().context("Cannot determine the session data directory"),
    }
}

fn no_color_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty()) || is_dumb_terminal()
}

/// Installs stderr logging plus a WARN+ append-only diagnostics file in
/// `data_dir`. The returned guard flushes the file on drop.
fn init_tracing(default_level: &str, data_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color_requested())
        .with_filter(filter);

    let mut file_error = None;
    let (file_layer, guard) = match data_dir.map(open_diagnostics_log) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::WARN);
            (Some(layer), Some(guard))
        }
        Some(Err(error)) => {
            file_error = Some(error);
            (None, None)
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if let Some(error) = file_error {
        warn!(error = %error, "Diagnostics log unavailable; logging to stderr only");
    }
    guard
}

fn open_diagnostics_log(dir: &Path) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create data directory '{}'", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(DIAGNOSTICS_LOG_FILE)
        .build(dir)
        .with_context(|| format!("Cannot open {DIAGNOSTICS_LOG_FILE} in '{}'", dir.display()))
}
