//! Opening the login page in the user's own browser.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

const OPENER_TIMEOUT: Duration = Duration::from_secs(10);

/// Browsers tried after the platform opener fails on Linux and BSDs.
const FALLBACK_BROWSERS: [&str; 4] = ["google-chrome", "firefox", "mozilla", "opera"];

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("no browser could be opened (tried: {})", tried.join(", "))]
    NoBrowser { tried: Vec<String> },
}

/// Opens a URL in an external browser.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self, url: &Url) -> Result<(), LaunchError>;
}

/// Launches through a configured command, the platform opener, then known
/// browser binaries.
#[derive(Debug, Clone, Default)]
pub struct SystemBrowserLauncher {
    configured_command: Option<String>,
}

impl SystemBrowserLauncher {
    #[must_use]
    pub fn new(configured_command: Option<String>) -> Self {
        Self {
            configured_command: configured_command.filter(|cmd| !cmd.trim().is_empty()),
        }
    }

    fn candidates(&self) -> Vec<LaunchCandidate> {
        let mut candidates = Vec::new();
        if let Some(command) = &self.configured_command {
            let mut parts = command.split_whitespace().map(str::to_string);
            if let Some(program) = parts.next() {
                candidates.push(LaunchCandidate {
                    program,
                    args: parts.collect(),
                    wait_for_exit: false,
                });
            }
        }
        candidates.push(platform_opener());
        if !cfg!(any(target_os = "macos", target_os = "windows")) {
            candidates.extend(FALLBACK_BROWSERS.iter().map(|program| LaunchCandidate {
                program: (*program).to_string(),
                args: Vec::new(),
                wait_for_exit: false,
            }));
        }
        candidates
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LaunchCandidate {
    program: String,
    args: Vec<String>,
    /// Openers hand off and exit; browsers keep running.
    wait_for_exit: bool,
}

fn platform_opener() -> LaunchCandidate {
    let (program, args) = if cfg!(target_os = "macos") {
        ("open", Vec::new())
    } else if cfg!(target_os = "windows") {
        ("rundll32", vec!["url.dll,FileProtocolHandler".to_string()])
    } else {
        ("xdg-open", Vec::new())
    };
    LaunchCandidate {
        program: program.to_string(),
        args,
        wait_for_exit: true,
    }
}

async fn try_launch(candidate: &LaunchCandidate, url: &Url) -> Result<(), String> {
    let mut child = Command::new(&candidate.program)
        .args(&candidate.args)
        .arg(url.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|error| error.to_string())?;

    if !candidate.wait_for_exit {
        return Ok(());
    }
    match tokio::time::timeout(OPENER_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(format!("exited with {status}")),
        Ok(Err(error)) => Err(error.to_string()),
        // Still running: the opener is attached to the browser it started.
        Err(_) => Ok(()),
    }
}

#[async_trait]
impl BrowserLauncher for SystemBrowserLauncher {
    async fn open(&self, url: &Url) -> Result<(), LaunchError> {
        let mut tried = Vec::new();
        for candidate in self.candidates() {
            match try_launch(&candidate, url).await {
                Ok(()) => {
                    info!(program = %candidate.program, url = %url, "Opened login page");
                    return Ok(());
                }
                Err(reason) => {
                    debug!(program = %candidate.program, reason = %reason, "Browser launch failed");
                    tried.push(candidate.program);
                }
            }
        }
        warn!(tried = ?tried, "No browser could be opened");
        Err(LaunchError::NoBrowser { tried })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_command_is_tried_first() {
        let launcher = SystemBrowserLauncher::new(Some("firefox --new-window".to_string()));
        let candidates = launcher.candidates();
        assert_eq!(candidates[0].program, "firefox");
        assert_eq!(candidates[0].args, vec!["--new-window"]);
        assert!(!candidates[0].wait_for_exit);
        assert_eq!(candidates[1], platform_opener());
    }

    #[test]
    fn test_blank_configured_command_is_ignored() {
        let launcher = SystemBrowserLauncher::new(Some("   ".to_string()));
        assert_eq!(launcher.candidates()[0], platform_opener());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_fallback_list_follows_xdg_open() {
        let programs: Vec<String> = SystemBrowserLauncher::default()
            .candidates()
            .into_iter()
            .map(|c| c.program)
            .collect();
        assert_eq!(
            programs,
            vec!["xdg-open", "google-chrome", "firefox", "mozilla", "opera"]
        );
    }

    #[tokio::test]
    async fn test_missing_program_reports_no_browser() {
        let candidate = LaunchCandidate {
            program: "definitely-not-a-browser-v0-session".to_string(),
            args: Vec::new(),
            wait_for_exit: true,
        };
        let url = Url::parse("https://v0.dev").unwrap();
        assert!(try_launch(&candidate, &url).await.is_err());
    }
}
