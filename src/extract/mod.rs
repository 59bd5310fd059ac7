//! Cookie extraction strategies for recovering an established session.
//!
//! A login happens in the user's own browser; this module tries to recover the
//! resulting session cookies without owning a browser engine. Strategies are
//! independent and run in priority order until one yields auth cookies.
//!
//! # Architecture
//!
//! - [`ExtractionStrategy`] - Async trait that individual probes implement
//! - [`StrategySet`] - Priority-ordered collection with a single-sweep runner
//! - [`ProbeOutcome`] - Tagged result of one probe (`Success` short-circuits)
//! - [`DirectApiProbe`] - `GET /api/user` with an isolated cookie jar
//! - [`BrowserProfileProbe`] - One per browser family; delegates to the direct probe
//! - [`AlternateEndpointApiProbe`] - Same mechanism over an ordered URL list

mod api_probe;
mod browser_profile;
mod http_client;

pub use api_probe::{AlternateEndpointApiProbe, DirectApiProbe};
pub(crate) use api_probe::body_has_user;
pub use browser_profile::{
    BrowserFamily, BrowserProfile, BrowserProfileProbe, ProfileRoots, detect_browser_profiles,
    has_any_known_browser,
};
pub use http_client::build_session_http_client;

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::auth::CookieJar;
use crate::config::ProbeHttpSettings;
use crate::target::TargetService;

/// Priority level for strategy ordering.
///
/// Strategies run Direct API first, then browser delegations, then alternate
/// endpoints. Within one level, registration order is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrategyPriority {
    /// `GET /api/user` against the target service.
    DirectApi = 0,
    /// Per-browser-family probes that require a local profile.
    BrowserDelegation = 1,
    /// Home page, app page and session endpoint probes.
    AlternateApi = 2,
}

/// Result of a single strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Auth cookies were recovered.
    Success(CookieJar),
    /// The strategy ran but found no auth cookies.
    NotFound,
}

/// Unexpected failures inside a strategy.
///
/// The strategy set logs these and treats them as [`ProbeOutcome::NotFound`].
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe '{strategy}' could not build an HTTP client: {reason}")]
    ClientBuild { strategy: String, reason: String },
    #[error("probe request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Inputs shared by every strategy in a sweep.
#[derive(Debug, Clone, Default)]
pub struct ProbeContext {
    pub target: TargetService,
    pub http: ProbeHttpSettings,
}

impl ProbeContext {
    #[must_use]
    pub fn new(target: TargetService, http: ProbeHttpSettings) -> Self {
        Self { target, http }
    }
}

/// Trait that all extraction strategies implement.
///
/// Uses `async_trait` so strategies can be stored as `Box<dyn ExtractionStrategy>`.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Stable name used in logs and the attempt trail.
    fn name(&self) -> &str;

    /// Ordering bucket.
    fn priority(&self) -> StrategyPriority;

    /// Tries once to recover auth cookies.
    async fn attempt(&self, ctx: &ProbeContext) -> Result<ProbeOutcome, ProbeError>;
}

/// Recorded result of one strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(CookieJar),
    NotFound,
    Error(String),
}

impl AttemptOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// One entry of the acquisition audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionAttempt {
    pub strategy_name: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for AcquisitionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match &self.outcome {
            AttemptOutcome::Success(jar) => format!("success ({} cookies)", jar.len()),
            AttemptOutcome::NotFound => "not found".to_string(),
            AttemptOutcome::Error(reason) => format!("error: {reason}"),
        };
        write!(
            f,
            "{} {} in {}ms: {outcome}",
            self.started_at.format("%H:%M:%S"),
            self.strategy_name,
            self.elapsed.as_millis()
        )
    }
}

/// Result of one pass over the strategy set.
#[derive(Debug, Default)]
pub struct SweepResult {
    /// Cookies from the first successful strategy, if any.
    pub cookies: Option<CookieJar>,
    /// Every attempt made in this pass, in order.
    pub attempts: Vec<AcquisitionAttempt>,
}

/// A priority-ordered collection of extraction strategies.
pub struct StrategySet {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl StrategySet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Registers a strategy; ordering stays stable within a priority level.
    pub fn register(&mut self, strategy: Box<dyn ExtractionStrategy>) {
        debug!(
            name = strategy.name(),
            priority = ?strategy.priority(),
            "Registering extraction strategy"
        );
        self.strategies.push(strategy);
        self.strategies.sort_by_key(|s| s.priority());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs every strategy once, stopping at the first success.
    ///
    /// Strategy errors never escape: they are logged, recorded, and treated
    /// as not found. A `Success` with an empty jar also counts as not found.
    pub async fn run_once(&self, ctx: &ProbeContext) -> SweepResult {
        let mut attempts = Vec::with_capacity(self.strategies.len());
        let cookies = self.run_until(ctx, &mut attempts, || false).await;
        SweepResult { cookies, attempts }
    }

    /// Like [`Self::run_once`], but checks `should_stop` before each strategy.
    ///
    /// Attempts are appended to `attempts` as they finish, so a caller that
    /// drops this future mid-sweep still keeps the completed ones.
    #[tracing::instrument(level = "debug", skip_all, fields(strategies = self.strategies.len()))]
    pub async fn run_until<F>(
        &self,
        ctx: &ProbeContext,
        attempts: &mut Vec<AcquisitionAttempt>,
        should_stop: F,
    ) -> Option<CookieJar>
    where
        F: Fn() -> bool + Send,
    {
        for strategy in &self.strategies {
            if should_stop() {
                debug!(
                    next = strategy.name(),
                    "Sweep stopped before every strategy ran"
                );
                return None;
            }

            let started_at = Utc::now();
            let clock = Instant::now();
            let result = strategy.attempt(ctx).await;
            let elapsed = clock.elapsed();

            let outcome = match result {
                Ok(ProbeOutcome::Success(jar)) if !jar.is_empty() => {
                    info!(
                        strategy = strategy.name(),
                        cookies = jar.len(),
                        "Extraction strategy recovered session cookies"
                    );
                    AttemptOutcome::Success(jar)
                }
                Ok(_) => {
                    debug!(strategy = strategy.name(), "No session cookies found");
                    AttemptOutcome::NotFound
                }
                Err(error) => {
                    warn!(
                        strategy = strategy.name(),
                        error = %error,
                        "Extraction strategy failed; treating as not found"
                    );
                    AttemptOutcome::Error(error.to_string())
                }
            };

            let found = match &outcome {
                AttemptOutcome::Success(jar) => Some(jar.clone()),
                _ => None,
            };
            attempts.push(AcquisitionAttempt {
                strategy_name: strategy.name().to_string(),
                started_at,
                elapsed,
                outcome,
            });
            if found.is_some() {
                return found;
            }
        }

        None
    }
}

impl fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategySet")
            .field("strategy_count", &self.strategies.len())
            .field("strategies", &self.names())
            .finish()
    }
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the default strategy set for the current platform.
///
/// Order: direct API, one probe per platform browser family, alternate endpoints.
#[must_use]
pub fn build_default_strategy_set(roots: &ProfileRoots) -> StrategySet {
    let mut set = StrategySet::new();
    set.register(Box::new(DirectApiProbe::new()));
    for family in BrowserFamily::for_current_platform() {
        set.register(Box::new(BrowserProfileProbe::new(*family, roots.clone())));
    }
    set.register(Box::new(AlternateEndpointApiProbe::new()));
    set
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::auth::SessionCredential;

    struct FakeStrategy {
        name: &'static str,
        priority: StrategyPriority,
        result: fn() -> Result<ProbeOutcome, ProbeError>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExtractionStrategy for FakeStrategy {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> StrategyPriority {
            self.priority
        }

        async fn attempt(&self, _ctx: &ProbeContext) -> Result<ProbeOutcome, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn fake(
        name: &'static str,
        priority: StrategyPriority,
        result: fn() -> Result<ProbeOutcome, ProbeError>,
    ) -> (Box<dyn ExtractionStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(FakeStrategy {
                name,
                priority,
                result,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn found() -> Result<ProbeOutcome, ProbeError> {
        Ok(ProbeOutcome::Success(
            [SessionCredential::new("__session", "v", "v0.dev")]
                .into_iter()
                .collect(),
        ))
    }

    fn not_found() -> Result<ProbeOutcome, ProbeError> {
        Ok(ProbeOutcome::NotFound)
    }

    fn failing() -> Result<ProbeOutcome, ProbeError> {
        Err(ProbeError::ClientBuild {
            strategy: "broken".to_string(),
            reason: "no tls".to_string(),
        })
    }

    #[test]
    fn test_strategy_priority_ordering() {
        assert!(StrategyPriority::DirectApi < StrategyPriority::BrowserDelegation);
        assert!(StrategyPriority::BrowserDelegation < StrategyPriority::AlternateApi);
    }

    #[test]
    fn test_register_sorts_stably_by_priority() {
        let mut set = StrategySet::new();
        set.register(fake("alt", StrategyPriority::AlternateApi, not_found).0);
        set.register(fake("chrome", StrategyPriority::BrowserDelegation, not_found).0);
        set.register(fake("direct", StrategyPriority::DirectApi, not_found).0);
        set.register(fake("firefox", StrategyPriority::BrowserDelegation, not_found).0);
        assert_eq!(set.names(), vec!["direct", "chrome", "firefox", "alt"]);
    }

    #[tokio::test]
    async fn test_run_once_stops_at_first_success() {
        let mut set = StrategySet::new();
        let (first, first_calls) = fake("direct", StrategyPriority::DirectApi, not_found);
        let (second, second_calls) = fake("chrome", StrategyPriority::BrowserDelegation, found);
        let (third, third_calls) = fake("alt", StrategyPriority::AlternateApi, found);
        set.register(first);
        set.register(second);
        set.register(third);

        let sweep = set.run_once(&ProbeContext::default()).await;
        assert_eq!(sweep.cookies.unwrap().names(), vec!["__session"]);
        assert_eq!(sweep.attempts.len(), 2);
        assert!(sweep.attempts[1].outcome.is_success());
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_once_treats_errors_as_not_found() {
        let mut set = StrategySet::new();
        let (broken, _) = fake("broken", StrategyPriority::DirectApi, failing);
        let (fallback, fallback_calls) = fake("alt", StrategyPriority::AlternateApi, not_found);
        set.register(broken);
        set.register(fallback);

        let sweep = set.run_once(&ProbeContext::default()).await;
        assert!(sweep.cookies.is_none());
        assert_eq!(sweep.attempts.len(), 2);
        assert!(matches!(sweep.attempts[0].outcome, AttemptOutcome::Error(_)));
        assert_eq!(sweep.attempts[1].outcome, AttemptOutcome::NotFound);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_once_empty_success_is_not_found() {
        let mut set = StrategySet::new();
        set.register(
            fake("empty", StrategyPriority::DirectApi, || {
                Ok(ProbeOutcome::Success(CookieJar::new()))
            })
            .0,
        );
        let sweep = set.run_once(&ProbeContext::default()).await;
        assert!(sweep.cookies.is_none());
        assert_eq!(sweep.attempts[0].outcome, AttemptOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_run_until_stops_between_strategies() {
        let mut set = StrategySet::new();
        let (first, first_calls) = fake("direct", StrategyPriority::DirectApi, not_found);
        let (second, second_calls) = fake("chrome", StrategyPriority::BrowserDelegation, found);
        set.register(first);
        set.register(second);

        let mut attempts = Vec::new();
        let stop_after_first = first_calls.clone();
        let cookies = set
            .run_until(&ProbeContext::default(), &mut attempts, move || {
                stop_after_first.load(Ordering::SeqCst) >= 1
            })
            .await;

        assert!(cookies.is_none());
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].strategy_name, "direct");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_until_stopped_up_front_runs_nothing() {
        let mut set = StrategySet::new();
        let (only, calls) = fake("direct", StrategyPriority::DirectApi, found);
        set.register(only);

        let mut attempts = Vec::new();
        let cookies = set
            .run_until(&ProbeContext::default(), &mut attempts, || true)
            .await;
        assert!(cookies.is_none());
        assert!(attempts.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_set_orders_direct_first_alternate_last() {
        let set = build_default_strategy_set(&ProfileRoots::empty());
        let names = set.names();
        assert_eq!(names.first(), Some(&"direct-api"));
        assert_eq!(names.last(), Some(&"alternate-endpoints"));
        assert_eq!(set.len(), BrowserFamily::for_current_platform().len() + 2);
    }

    #[test]
    fn test_attempt_display_omits_cookie_values() {
        let attempt = AcquisitionAttempt {
            strategy_name: "direct-api".to_string(),
            started_at: Utc::now(),
            elapsed: Duration::from_millis(12),
            outcome: AttemptOutcome::Success(
                [SessionCredential::new("__session", "secret-value", "v0.dev")]
                    .into_iter()
                    .collect(),
            ),
        };
        let rendered = attempt.to_string();
        assert!(rendered.contains("direct-api"));
        assert!(rendered.contains("success (1 cookies)"));
        assert!(!rendered.contains("secret-value"));
    }
}
