//! CLI command handlers.

mod auth;
mod status;

pub use auth::{run_import_command, run_login_command, run_logout_command};
pub use status::{
    format_session_age, run_browsers_command, run_cookies_command, run_status_command,
    run_whoami_command,
};
