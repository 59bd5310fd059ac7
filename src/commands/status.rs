//! Read-only command handlers: status, cookies, whoami and browsers.

use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use tracing::info;
use v0_session::SessionManager;
use v0_session::extract::{ProfileRoots, detect_browser_profiles};

pub fn run_status_command(manager: &SessionManager) -> Result<()> {
    let store = manager.store();
    let logged_in = manager.is_logged_in();

    println!("logged_in = {}", if logged_in { "yes" } else { "no" });
    println!(
        "session_age = {}",
        manager
            .session_age()
            .map_or_else(|| "none".to_string(), format_session_age)
    );
    println!("target = {}", manager.target().base_url());
    println!("auth_file = {}", store.auth_path().display());
    println!("cookies_file = {}", store.cookies_path().display());
    if logged_in {
        println!("cookies = {}", manager.get_cookies().len());
    } else if store.exists() {
        info!("A stored session exists but is expired or incomplete; run `v0-session login`");
    }

    Ok(())
}

pub fn run_cookies_command(manager: &SessionManager, header: bool) -> Result<()> {
    let cookies = manager.get_cookies();
    if cookies.is_empty() {
        bail!("No valid session stored; run `v0-session login` first");
    }

    if header {
        let value = cookies
            .to_cookie_header()
            .ok_or_else(|| anyhow!("Stored session has no cookies"))?;
        println!("Cookie: {value}");
        return Ok(());
    }

    for cookie in cookies.iter() {
        let marker = if cookie.is_auth_cookie() { " (session)" } else { "" };
        println!("{}\t{}\t{}{marker}", cookie.name, cookie.domain, cookie.path);
    }
    Ok(())
}

pub async fn run_whoami_command(manager: &SessionManager) -> Result<()> {
    if !manager.is_logged_in() {
        bail!("No valid session stored; run `v0-session login` first");
    }

    let signed_in = manager
        .whoami()
        .await
        .map_err(|error| anyhow!("User check failed: {error}"))?;
    println!("user_url = {}", manager.target().user_url());
    println!("signed_in = {}", if signed_in { "yes" } else { "no" });
    Ok(())
}

pub fn run_browsers_command(roots: &ProfileRoots) -> Result<()> {
    let profiles = detect_browser_profiles(roots);
    if profiles.is_empty() {
        println!("No browser profiles found");
        return Ok(());
    }

    for profile in &profiles {
        println!("{} = {}", profile.family, profile.path.display());
    }
    Ok(())
}

/// Renders an age as its two most significant units, e.g. `3d 4h` or `12m`.
#[must_use]
pub fn format_session_age(age: Duration) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    let secs = age.as_secs();
    let days = secs / DAY;
    let hours = (secs % DAY) / HOUR;
    let minutes = (secs % HOUR) / MINUTE;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{secs}s")
    }
}
