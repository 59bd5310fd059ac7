//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Acquire and manage a v0.dev browser session for local tools.
///
/// Sessions are captured from an already-logged-in browser when possible,
/// otherwise by opening the login page and waiting, with pasted cookies as
/// the last resort.
#[derive(Parser, Debug)]
#[command(name = "v0-session")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding auth.json, cookies.json and diagnostics.log
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the target service
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Config file to read instead of <data dir>/config.toml
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Capture a session from a browser, opening the login page if needed
    Login,
    /// Delete the stored session
    Logout,
    /// Show whether a valid session is stored
    Status,
    /// List stored cookie names (values are never printed)
    Cookies {
        /// Print a ready-to-use Cookie header instead
        #[arg(long)]
        header: bool,
    },
    /// Import cookies pasted from browser DevTools or an export file
    Import {
        /// File to read; "-" or omitted reads stdin
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Ask the service whether the stored session is signed in
    Whoami,
    /// List browser profile directories found on this machine
    Browsers,
}

impl Args {
    /// Default tracing filter from `-q` / `-v`, or `None` when neither is given.
    #[must_use]
    pub fn cli_log_level(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("error");
        }
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}
