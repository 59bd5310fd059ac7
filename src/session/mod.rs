//! Session acquisition and the downstream consumer interface.
//!
//! [`SessionManager`] owns a single background worker. Login, import and
//! logout jobs are queued and executed strictly one at a time, so only that
//! worker ever writes or clears the on-disk session.

mod browser;
mod controller;

pub use browser::{BrowserLauncher, LaunchError, SystemBrowserLauncher};
pub use controller::{
    AcquisitionContext, AcquisitionError, AcquisitionReport, AcquisitionState,
    LOGIN_CONFIRM_PROMPT, MANUAL_INPUT_INSTRUCTIONS, SessionAcquisitionController,
};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::auth::{
    AuthStateStore, Clock, CookieJar, CookieJarHandle, StoreError, ValidityChecker,
    load_cookies_into_jar,
};
use crate::config::{AcquisitionSettings, ProbeHttpSettings, Settings};
use crate::extract::{
    ProbeContext, ProbeError, ProfileRoots, StrategySet, body_has_user,
    build_default_strategy_set, build_session_http_client,
};
use crate::interaction::{HeadlessInteraction, UserInteractionPort};
use crate::target::{TargetError, TargetService};

/// Errors from the consumer interface.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session worker has stopped")]
    WorkerStopped,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Client(#[from] ProbeError),
}

/// Callback receiving the terminal report of a login cycle, exactly once.
pub type CompletionCallback = Box<dyn FnOnce(AcquisitionReport) + Send + 'static>;

enum Job {
    Login {
        interaction: Arc<dyn UserInteractionPort>,
        on_complete: CompletionCallback,
    },
    Import {
        input: String,
        done: oneshot::Sender<AcquisitionReport>,
    },
    Logout {
        done: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Handle to the persisted session and its acquisition worker.
///
/// Cloning is cheap; clones share the worker and the active cookie handle.
#[derive(Clone)]
pub struct SessionManager {
    ctx: AcquisitionContext,
    jobs: mpsc::UnboundedSender<Job>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn builder(store: AuthStateStore) -> SessionManagerBuilder {
        SessionManagerBuilder::new(store)
    }

    #[must_use]
    pub fn store(&self) -> &AuthStateStore {
        &self.ctx.store
    }

    #[must_use]
    pub fn target(&self) -> &TargetService {
        &self.ctx.probe.target
    }

    /// Shared view of the active session's cookies.
    #[must_use]
    pub fn cookie_handle(&self) -> CookieJarHandle {
        self.ctx.active.clone()
    }

    /// True iff a record exists, it is younger than 30 days, and the cookie
    /// file is present.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        match self.ctx.store.load() {
            Ok(Some(record)) => self
                .ctx
                .validity
                .is_valid(&record, self.ctx.store.cookie_jar_present()),
            Ok(None) => false,
            Err(error) => {
                warn!(error = %error, "Stored session record is unreadable");
                false
            }
        }
    }

    /// Age of the stored session, if a record exists.
    #[must_use]
    pub fn session_age(&self) -> Option<Duration> {
        let record = self.ctx.store.load().ok().flatten()?;
        let millis = u64::try_from(self.ctx.validity.age_millis(&record)).unwrap_or(0);
        Some(Duration::from_millis(millis))
    }

    /// Active cookies, loading them from disk when the session is valid but
    /// not yet in memory.
    ///
    /// Validity is rechecked on every call. Once the stored session expires
    /// or is removed, the in-memory jar is dropped as well.
    #[must_use]
    pub fn get_cookies(&self) -> CookieJar {
        if !self.is_logged_in() {
            if !self.ctx.active.is_empty() {
                info!("Stored session is no longer valid; dropping active cookies");
                self.ctx.active.clear();
            }
            return CookieJar::new();
        }
        let active = self.ctx.active.snapshot();
        if !active.is_empty() {
            return active;
        }
        let stored = self.ctx.store.load_cookies();
        if !stored.is_empty() {
            debug!(cookies = stored.len(), "Loaded stored session into active handle");
            self.ctx.active.replace(stored.clone());
        }
        stored
    }

    /// `Cookie` header value for the active session.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        self.get_cookies().to_cookie_header()
    }

    /// HTTP client that sends the session cookies to the target service.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Client`] when the client cannot be built.
    pub fn authenticated_client(&self) -> Result<reqwest::Client, SessionError> {
        let jar = load_cookies_into_jar(&self.get_cookies());
        Ok(build_session_http_client(&self.ctx.probe.http, jar)?)
    }

    /// Asks the user endpoint whether the session cookies are signed in.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Client`] when the client cannot be built or
    /// the request fails.
    pub async fn whoami(&self) -> Result<bool, SessionError> {
        let url = self.target().user_url();
        let client = self.authenticated_client()?;
        let request_error = |source| ProbeError::Request {
            url: url.to_string(),
            source,
        };
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(request_error)?;
        let signed_in = body_has_user(&body);
        debug!(url = %url, status = %status, signed_in, "User endpoint answered");
        Ok(signed_in)
    }

    /// Queues a login cycle; `on_complete` runs once with the final report.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WorkerStopped`] if the worker is gone.
    pub fn login(
        &self,
        interaction: Arc<dyn UserInteractionPort>,
        on_complete: impl FnOnce(AcquisitionReport) + Send + 'static,
    ) -> Result<(), SessionError> {
        self.jobs
            .send(Job::Login {
                interaction,
                on_complete: Box::new(on_complete),
            })
            .map_err(|_| SessionError::WorkerStopped)
    }

    /// Queues a login cycle and waits for its report.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WorkerStopped`] if the worker is gone.
    pub async fn login_and_wait(
        &self,
        interaction: Arc<dyn UserInteractionPort>,
    ) -> Result<AcquisitionReport, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.login(interaction, move |report| {
            let _ = tx.send(report);
        })?;
        rx.await.map_err(|_| SessionError::WorkerStopped)
    }

    /// Parses pasted cookie text and persists it as a new session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WorkerStopped`] if the worker is gone.
    pub async fn import_cookies(
        &self,
        input: impl Into<String>,
    ) -> Result<AcquisitionReport, SessionError> {
        let (done, rx) = oneshot::channel();
        self.jobs
            .send(Job::Import {
                input: input.into(),
                done,
            })
            .map_err(|_| SessionError::WorkerStopped)?;
        rx.await.map_err(|_| SessionError::WorkerStopped)
    }

    /// Deletes both session files and clears the active cookies.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if a present file cannot be removed,
    /// or [`SessionError::WorkerStopped`] if the worker is gone.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let (done, rx) = oneshot::channel();
        self.jobs
            .send(Job::Logout { done })
            .map_err(|_| SessionError::WorkerStopped)?;
        rx.await.map_err(|_| SessionError::WorkerStopped)??;
        Ok(())
    }
}

async fn run_worker(ctx: AcquisitionContext, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Login {
                interaction,
                on_complete,
            } => {
                let report = SessionAcquisitionController::new(ctx.clone(), interaction)
                    .run()
                    .await;
                on_complete(report);
            }
            Job::Import { input, done } => {
                let report = SessionAcquisitionController::new(
                    ctx.clone(),
                    Arc::new(HeadlessInteraction::new()),
                )
                .run_import(&input);
                let _ = done.send(report);
            }
            Job::Logout { done } => {
                ctx.active.clear();
                let result = ctx.store.clear();
                match &result {
                    Ok(()) => info!("Logged out; session files removed"),
                    Err(error) => warn!(error = %error, "Logout could not remove session files"),
                }
                let _ = done.send(result);
            }
        }
    }
    debug!("Session worker stopped");
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    store: AuthStateStore,
    target: TargetService,
    acquisition: AcquisitionSettings,
    probe_http: ProbeHttpSettings,
    delete_stale_sessions: bool,
    browser_command: Option<String>,
    strategies: Option<StrategySet>,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    clock: Option<Arc<dyn Clock>>,
    profile_roots: Option<ProfileRoots>,
}

impl fmt::Debug for SessionManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManagerBuilder")
            .field("store", &self.store)
            .field("target", &self.target)
            .field("acquisition", &self.acquisition)
            .finish_non_exhaustive()
    }
}

impl SessionManagerBuilder {
    #[must_use]
    pub fn new(store: AuthStateStore) -> Self {
        Self {
            store,
            target: TargetService::default(),
            acquisition: AcquisitionSettings::default(),
            probe_http: ProbeHttpSettings::default(),
            delete_stale_sessions: false,
            browser_command: None,
            strategies: None,
            launcher: None,
            clock: None,
            profile_roots: None,
        }
    }

    /// Applies resolved settings (target URL, timings, stale policy).
    ///
    /// # Errors
    ///
    /// Returns [`TargetError`] if `settings.base_url` is invalid.
    pub fn settings(mut self, settings: &Settings) -> Result<Self, TargetError> {
        self.target = TargetService::new(&settings.base_url)?;
        self.acquisition = settings.acquisition;
        self.probe_http = settings.probe_http;
        self.delete_stale_sessions = settings.delete_stale_sessions;
        self.browser_command.clone_from(&settings.browser_command);
        Ok(self)
    }

    #[must_use]
    pub fn target(mut self, target: TargetService) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn acquisition(mut self, acquisition: AcquisitionSettings) -> Self {
        self.acquisition = acquisition;
        self
    }

    #[must_use]
    pub fn probe_http(mut self, probe_http: ProbeHttpSettings) -> Self {
        self.probe_http = probe_http;
        self
    }

    #[must_use]
    pub fn delete_stale_sessions(mut self, enabled: bool) -> Self {
        self.delete_stale_sessions = enabled;
        self
    }

    /// Replaces the default strategy set.
    #[must_use]
    pub fn strategies(mut self, strategies: StrategySet) -> Self {
        self.strategies = Some(strategies);
        self
    }

    #[must_use]
    pub fn launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn profile_roots(mut self, roots: ProfileRoots) -> Self {
        self.profile_roots = Some(roots);
        self
    }

    /// Builds the manager and spawns its worker.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn build(self) -> SessionManager {
        let roots = self.profile_roots.unwrap_or_else(ProfileRoots::from_system);
        let strategies = self
            .strategies
            .unwrap_or_else(|| build_default_strategy_set(&roots));
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(SystemBrowserLauncher::new(self.browser_command)));
        let validity = self
            .clock
            .map_or_else(ValidityChecker::default, ValidityChecker::new);

        let ctx = AcquisitionContext {
            store: self.store,
            validity,
            strategies: Arc::new(strategies),
            probe: ProbeContext::new(self.target, self.probe_http),
            launcher,
            active: CookieJarHandle::new(),
            settings: self.acquisition,
            delete_stale_sessions: self.delete_stale_sessions,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(ctx.clone(), rx));
        SessionManager { ctx, jobs: tx }
    }
}
