//! HTTP probes against the target service.
//!
//! Both probes issue plain GET requests through a client with its own fresh
//! cookie jar. Cookies come from two places: the jar (filled by `Set-Cookie`
//! on redirect hops) and the final response's `Set-Cookie` headers. The
//! header cookies carry full attributes and win on name collisions.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use tracing::{debug, info, instrument};
use url::Url;

use crate::auth::{CookieJar, SessionCredential};

use super::http_client::build_probe_http_client;
use super::{ExtractionStrategy, ProbeContext, ProbeError, ProbeOutcome, StrategyPriority};

/// Probes `GET {base}/api/user`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectApiProbe;

impl DirectApiProbe {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExtractionStrategy for DirectApiProbe {
    fn name(&self) -> &'static str {
        "direct-api"
    }

    fn priority(&self) -> StrategyPriority {
        StrategyPriority::DirectApi
    }

    async fn attempt(&self, ctx: &ProbeContext) -> Result<ProbeOutcome, ProbeError> {
        probe_url(self.name(), &ctx.target.user_url(), ctx).await
    }
}

/// Probes the home page, app page and session endpoint in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlternateEndpointApiProbe;

impl AlternateEndpointApiProbe {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExtractionStrategy for AlternateEndpointApiProbe {
    fn name(&self) -> &'static str {
        "alternate-endpoints"
    }

    fn priority(&self) -> StrategyPriority {
        StrategyPriority::AlternateApi
    }

    async fn attempt(&self, ctx: &ProbeContext) -> Result<ProbeOutcome, ProbeError> {
        let mut last_error = None;
        let mut answered = false;
        for url in ctx.target.alternate_urls() {
            match probe_url(self.name(), &url, ctx).await {
                Ok(ProbeOutcome::Success(jar)) => return Ok(ProbeOutcome::Success(jar)),
                Ok(ProbeOutcome::NotFound) => answered = true,
                Err(error) => {
                    debug!(url = %url, error = %error, "Alternate endpoint failed; trying next");
                    last_error = Some(error);
                }
            }
        }
        // An error surfaces only when no endpoint answered at all.
        match last_error {
            Some(error) if !answered => Err(error),
            _ => Ok(ProbeOutcome::NotFound),
        }
    }
}

/// Sends one isolated GET and collects any cookies it produced.
#[instrument(level = "debug", skip(ctx), fields(url = %url))]
pub(crate) async fn probe_url(
    strategy: &str,
    url: &Url,
    ctx: &ProbeContext,
) -> Result<ProbeOutcome, ProbeError> {
    let jar = Arc::new(Jar::default());
    let client = build_probe_http_client(strategy, &ctx.http, jar.clone())?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|source| ProbeError::Request {
            url: url.to_string(),
            source,
        })?;

    let final_url = response.url().clone();
    let status = response.status();
    let domain = ctx.target.domain();

    let mut cookies = cookies_from_jar(&jar, &[url, &final_url], domain);
    let header_cookies: CookieJar = response
        .cookies()
        .map(|cookie| {
            SessionCredential::new(
                cookie.name(),
                cookie.value(),
                cookie.domain().unwrap_or(domain),
            )
            .with_path(cookie.path().unwrap_or("/"))
            .with_max_age(
                cookie
                    .max_age()
                    .and_then(|age| i64::try_from(age.as_secs()).ok()),
            )
            .with_flags(cookie.http_only(), cookie.secure())
        })
        .collect();
    cookies.merge(header_cookies);

    let user_present = match response.bytes().await {
        Ok(body) => body_has_user(&body),
        Err(error) => {
            debug!(error = %error, "Failed to read probe response body");
            false
        }
    };

    debug!(
        strategy,
        status = status.as_u16(),
        final_url = %final_url,
        cookie_names = ?cookies.names(),
        user_present,
        "Probe response received"
    );

    if cookies.has_auth_cookies() {
        info!(strategy, url = %url, user_present, "Probe found auth cookies");
        Ok(ProbeOutcome::Success(cookies))
    } else {
        Ok(ProbeOutcome::NotFound)
    }
}

/// Reads the isolated jar's `Cookie` header for each URL.
///
/// The jar exposes only `name=value` pairs, so these credentials get the
/// target domain and path `/`.
fn cookies_from_jar(jar: &Jar, urls: &[&Url], domain: &str) -> CookieJar {
    let mut cookies = CookieJar::new();
    for url in urls {
        let Some(header) = jar.cookies(url) else {
            continue;
        };
        let Ok(header) = header.to_str() else {
            continue;
        };
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=')
                && !name.is_empty()
            {
                cookies.insert(SessionCredential::new(name, value, domain));
            }
        }
    }
    cookies
}

/// Returns true when the body is JSON with a truthy `user` field.
pub(crate) fn body_has_user(body: &[u8]) -> bool {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };
    match value.get("user") {
        None | Some(serde_json::Value::Null | serde_json::Value::Bool(false)) => false,
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        Some(serde_json::Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}
