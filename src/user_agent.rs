//! Shared User-Agent strings for probe and session HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/varungulati/v0-session";

/// Desktop browser User-Agent sent by extraction probes.
///
/// Probes must look like the browser that performed the login, otherwise the
/// service answers with a bot challenge instead of its session endpoints.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// `Accept` header sent with browser-like probe requests.
pub const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8";

/// Default User-Agent for authenticated session requests (identifies the tool).
#[must_use]
pub(crate) fn default_session_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("v0-session/{version} (+{PROJECT_UA_URL})")
}
