//! Shared HTTP client construction policy for probes and session requests.
//!
//! Probe clients impersonate a desktop browser and always receive a fresh
//! cookie jar so one probe never observes another probe's cookies.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use crate::config::ProbeHttpSettings;
use crate::user_agent::{BROWSER_ACCEPT, BROWSER_USER_AGENT, default_session_user_agent};

use super::ProbeError;

/// Builds a browser-like probe client bound to `cookie_jar`.
///
/// # Errors
///
/// Returns [`ProbeError::ClientBuild`] when client construction fails.
pub(crate) fn build_probe_http_client(
    strategy_name: &str,
    settings: &ProbeHttpSettings,
    cookie_jar: Arc<Jar>,
) -> Result<Client, ProbeError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    build_client(
        strategy_name,
        settings,
        BROWSER_USER_AGENT,
        headers,
        Some(cookie_jar),
    )
}

/// Builds a client for downstream requests carrying the session cookies.
///
/// # Errors
///
/// Returns [`ProbeError::ClientBuild`] when client construction fails.
pub fn build_session_http_client(
    settings: &ProbeHttpSettings,
    cookie_jar: Arc<Jar>,
) -> Result<Client, ProbeError> {
    build_client(
        "session",
        settings,
        &default_session_user_agent(),
        HeaderMap::new(),
        Some(cookie_jar),
    )
}

fn build_client(
    name: &str,
    settings: &ProbeHttpSettings,
    user_agent: &str,
    headers: HeaderMap,
    cookie_jar: Option<Arc<Jar>>,
) -> Result<Client, ProbeError> {
    let initial = try_build_client(settings, user_agent, headers.clone(), cookie_jar.clone(), false);
    match initial {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed macOS environments panic while reading system
            // proxy settings; retry with env proxies only.
            warn!(
                client = name,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            try_build_client(settings, user_agent, headers, cookie_jar, true)
                .map_err(|failure| failure.into_probe_error(name))
        }
        Err(failure) => Err(failure.into_probe_error(name)),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

impl BuildClientFailure {
    fn into_probe_error(self, name: &str) -> ProbeError {
        let reason = match self {
            Self::Panic => "HTTP client construction panicked".to_string(),
            Self::Build(error) => format!("HTTP client construction failed: {error}"),
        };
        ProbeError::ClientBuild {
            strategy: name.to_string(),
            reason,
        }
    }
}

fn try_build_client(
    settings: &ProbeHttpSettings,
    user_agent: &str,
    headers: HeaderMap,
    cookie_jar: Option<Arc<Jar>>,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let settings = *settings;
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(&settings, user_agent, headers, cookie_jar);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(
    settings: &ProbeHttpSettings,
    user_agent: String,
    headers: HeaderMap,
    cookie_jar: Option<Arc<Jar>>,
) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.read_timeout)
        .user_agent(user_agent)
        .default_headers(headers)
        .gzip(true);

    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(jar);
    }

    builder
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_client_builds_with_fresh_jar() {
        let settings = ProbeHttpSettings::default();
        assert!(build_probe_http_client("direct-api", &settings, Arc::new(Jar::default())).is_ok());
    }

    #[test]
    fn test_session_client_builds() {
        let settings = ProbeHttpSettings::default();
        assert!(build_session_http_client(&settings, Arc::new(Jar::default())).is_ok());
    }

    #[test]
    fn test_env_proxy_for_unknown_scheme_is_none() {
        assert!(env_proxy_for_scheme("ftp").is_none());
    }

    #[test]
    fn test_client_build_error_names_client() {
        let error = BuildClientFailure::Panic.into_probe_error("chrome-profile");
        assert!(error.to_string().contains("chrome-profile"));
    }
}
