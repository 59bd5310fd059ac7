//! Session cookie model and reqwest jar loader.
//!
//! A [`SessionCredential`] is one cookie recovered for the target service. A
//! [`CookieJar`] is the de-duplicated-by-name set of them, and a
//! [`CookieJarHandle`] is the shared, explicitly injected view of the active
//! session's cookies.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use reqwest::cookie::Jar;
use tracing::{debug, instrument, warn};
use url::Url;

/// Cookie names that always indicate an authenticated session.
pub const AUTH_COOKIE_ALLOW_LIST: [&str; 7] = [
    "next-auth.session-token",
    "__Secure-next-auth.session-token",
    "__Host-next-auth.csrf-token",
    "__session",
    "session",
    "auth_token",
    "access_token",
];

/// Name fragments that mark a cookie as auth-bearing (case-sensitive).
const AUTH_NAME_FRAGMENTS: [&str; 3] = ["auth", "token", "session"];

/// A single cookie recovered for the target service.
///
/// The value is intentionally redacted in Debug output to prevent
/// accidental logging of session secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    /// Cookie name.
    pub name: String,
    /// The domain the cookie belongs to (e.g., `v0.dev` or `.v0.dev`).
    pub domain: String,
    /// The URL path scope for the cookie.
    pub path: String,
    /// Max-Age in seconds; `None` for a session cookie.
    pub max_age_seconds: Option<i64>,
    /// Whether the cookie is hidden from scripts.
    pub http_only: bool,
    /// Whether the cookie should only be sent over HTTPS.
    pub secure: bool,
    /// Cookie value (sensitive, never log).
    value: String,
}

impl SessionCredential {
    /// Creates a host cookie with path `/` and no attributes.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            path: "/".to_string(),
            max_age_seconds: None,
            http_only: false,
            secure: false,
            value: value.into(),
        }
    }

    /// Sets the path scope.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the Max-Age in seconds.
    #[must_use]
    pub fn with_max_age(mut self, max_age_seconds: Option<i64>) -> Self {
        self.max_age_seconds = max_age_seconds;
        self
    }

    /// Sets the `HttpOnly` and `Secure` flags.
    #[must_use]
    pub fn with_flags(mut self, http_only: bool, secure: bool) -> Self {
        self.http_only = http_only;
        self.secure = secure;
        self
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; never log the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when the name matches the auth heuristic.
    #[must_use]
    pub fn is_auth_cookie(&self) -> bool {
        is_auth_cookie_name(&self.name)
    }
}

// Custom Debug impl that redacts the cookie value.
impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("max_age_seconds", &self.max_age_seconds)
            .field("http_only", &self.http_only)
            .field("secure", &self.secure)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Returns true when a cookie name is on the allow-list or contains one of the
/// auth fragments.
///
/// This is a heuristic: unrelated cookies such as `csrf_token` also match.
#[must_use]
pub fn is_auth_cookie_name(name: &str) -> bool {
    AUTH_COOKIE_ALLOW_LIST.contains(&name)
        || AUTH_NAME_FRAGMENTS
            .iter()
            .any(|fragment| name.contains(fragment))
}

/// A set of session cookies keyed by name.
///
/// Inserting a cookie whose name already exists replaces the earlier one.
/// Iteration is ordered by name so persisted output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: BTreeMap<String, SessionCredential>,
}

impl CookieJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a cookie, replacing any existing cookie with the same name.
    pub fn insert(&mut self, cookie: SessionCredential) {
        self.entries.insert(cookie.name.clone(), cookie);
    }

    /// Merges another jar into this one; `other` wins on name collisions.
    pub fn merge(&mut self, other: CookieJar) {
        self.entries.extend(other.entries);
    }

    /// Looks up a cookie by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SessionCredential> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates cookies in name order.
    pub fn iter(&self) -> impl Iterator<Item = &SessionCredential> {
        self.entries.values()
    }

    /// Returns the cookie names in name order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Returns true if at least one cookie looks like an auth cookie.
    #[must_use]
    pub fn has_auth_cookies(&self) -> bool {
        self.iter().any(SessionCredential::is_auth_cookie)
    }

    /// Renders the jar as a `Cookie` request header value.
    ///
    /// Returns `None` for an empty jar.
    #[must_use]
    pub fn to_cookie_header(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(
            self.iter()
                .map(|cookie| format!("{}={}", cookie.name, cookie.value()))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl FromIterator<SessionCredential> for CookieJar {
    fn from_iter<T: IntoIterator<Item = SessionCredential>>(iter: T) -> Self {
        let mut jar = Self::new();
        for cookie in iter {
            jar.insert(cookie);
        }
        jar
    }
}

impl IntoIterator for CookieJar {
    type Item = SessionCredential;
    type IntoIter = std::collections::btree_map::IntoValues<String, SessionCredential>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

/// Shared handle to the active session's cookies.
///
/// Components that need the session receive a clone of the handle instead of
/// reading process-global cookie state.
#[derive(Debug, Clone, Default)]
pub struct CookieJarHandle {
    inner: Arc<RwLock<CookieJar>>,
}

impl CookieJarHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active cookies.
    pub fn replace(&self, jar: CookieJar) {
        match self.inner.write() {
            Ok(mut guard) => *guard = jar,
            Err(poisoned) => *poisoned.into_inner() = jar,
        }
    }

    /// Removes all active cookies.
    pub fn clear(&self) {
        self.replace(CookieJar::new());
    }

    /// Returns a copy of the active cookies.
    #[must_use]
    pub fn snapshot(&self) -> CookieJar {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

/// Loads a cookie jar into a `reqwest::cookie::Jar`.
///
/// Cookies whose domain starts with `.` are added with a `Domain` attribute
/// (subdomain matching); all others are host-only cookies for their domain.
///
/// # Returns
///
/// An `Arc<Jar>` suitable for passing to `reqwest::ClientBuilder::cookie_provider()`.
#[instrument(level = "debug", skip(cookies), fields(count = cookies.len()))]
pub fn load_cookies_into_jar(cookies: &CookieJar) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());

    for cookie in cookies.iter() {
        let set_cookie = build_set_cookie_string(cookie);
        let origin_url = build_origin_url(cookie);

        if let Ok(url) = origin_url.parse::<Url>() {
            jar.add_cookie_str(&set_cookie, &url);
            debug!(domain = %cookie.domain, name = %cookie.name, "loaded cookie into jar");
        } else {
            warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                "skipping cookie with unparseable domain"
            );
        }
    }

    jar
}

/// Builds a `Set-Cookie` header string from a credential.
fn build_set_cookie_string(cookie: &SessionCredential) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value())];

    if cookie.domain.starts_with('.') {
        parts.push(format!("Domain={}", cookie.domain));
    }

    parts.push(format!("Path={}", cookie.path));

    if cookie.secure {
        parts.push("Secure".to_string());
    }
    if cookie.http_only {
        parts.push("HttpOnly".to_string());
    }

    // Non-positive Max-Age would delete the cookie on insert; keep it as a session cookie.
    if let Some(max_age) = cookie.max_age_seconds.filter(|age| *age > 0) {
        parts.push(format!("Max-Age={max_age}"));
    }

    parts.join("; ")
}

/// Builds the origin URL for `Jar::add_cookie_str`.
///
/// Uses `https://` for secure cookies and `http://` for non-secure.
fn build_origin_url(cookie: &SessionCredential) -> String {
    let scheme = if cookie.secure { "https" } else { "http" };
    let domain = cookie.domain.strip_prefix('.').unwrap_or(&cookie.domain);
    let path = if cookie.path.starts_with('/') {
        cookie.path.as_str()
    } else {
        "/"
    };
    format!("{scheme}://{domain}{path}")
}
