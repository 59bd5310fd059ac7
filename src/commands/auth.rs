//! Auth command handlers: login, logout and cookie import.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, warn};
use v0_session::SessionManager;
use v0_session::interaction::{
    CancellationFlag, TerminalInteraction, is_dumb_terminal, should_use_progress_bar,
};

pub async fn run_login_command(manager: &SessionManager, quiet: bool) -> Result<()> {
    let cancel = CancellationFlag::new();
    let ctrl_c = cancel.cancel_on_ctrl_c();
    let show_progress =
        should_use_progress_bar(io::stderr().is_terminal(), quiet, is_dumb_terminal());
    let interaction = Arc::new(TerminalInteraction::new(show_progress, cancel));

    info!(url = %manager.target().login_url(), "Starting login");
    let report = manager.login_and_wait(interaction.clone()).await;
    interaction.finish();
    ctrl_c.abort();

    let report = report.context("Login could not be started")?;
    for attempt in &report.attempts {
        debug!("{attempt}");
    }
    info!(
        attempts = report.attempts.len(),
        state = ?report.final_state(),
        "Login finished"
    );
    if !report.is_success() {
        bail!("Login failed: {}", report.message());
    }

    println!("{}", report.message());
    println!("cookies_file = {}", manager.store().cookies_path().display());
    Ok(())
}

pub async fn run_logout_command(manager: &SessionManager) -> Result<()> {
    let had_session = manager.store().exists() || manager.store().cookie_jar_present();
    manager
        .logout()
        .await
        .map_err(|error| anyhow!("Failed to remove session files: {error}"))?;

    if had_session {
        println!("Logged out");
    } else {
        println!("No stored session found");
    }
    Ok(())
}

pub async fn run_import_command(manager: &SessionManager, file: Option<&Path>) -> Result<()> {
    let raw_input = match file {
        Some(path) if path != Path::new("-") => read_cookie_file(path)?,
        _ => read_cookie_input_from_stdin()?,
    };

    let report = manager
        .import_cookies(raw_input)
        .await
        .context("Cookie import could not be started")?;
    if !report.is_success() {
        bail!("Cookie import failed: {}", report.message());
    }

    let cookies = report.cookies().map_or(0, |jar| jar.len());
    if report.cookies().is_some_and(|jar| !jar.has_auth_cookies()) {
        warn!("Imported cookies do not include a recognized session cookie");
    }
    info!(cookies, path = %manager.store().dir().display(), "Imported cookies");
    println!("{}", report.message());
    Ok(())
}

fn read_cookie_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|error| anyhow!("Cannot read cookie file '{}': {}", path.display(), error))
}

fn read_cookie_input_from_stdin() -> Result<String> {
    if io::stdin().is_terminal() {
        info!("Paste cookies (JSON export, cookies.txt or name=value lines), then press Ctrl-D:");
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        bail!("No cookie data provided on stdin");
    }

    if !trimmed.contains('\n') && Path::new(trimmed).is_file() {
        return read_cookie_file(Path::new(trimmed));
    }

    Ok(buffer)
}
