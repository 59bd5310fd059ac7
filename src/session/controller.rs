//! The session acquisition state machine.
//!
//! ```text
//! Idle → CheckingExisting ─valid─────────────────────────────────→ Succeeded
//!            │ └─sweep hit──────────────────────────→ Persisting → Succeeded
//!            ↓                                              ↑         │
//!   OpeningExternalLogin → PollingExtraction ─sweep hit─────┤   save error → Failed
//!            │ no browser        │ cancelled → Cancelled    │
//!            ↓                   ↓ deadline                 │
//!          Failed       ManualConfirmPending ─yes, hit──────┤
//!                          │ no → Failed                    │
//!                          ↓ yes, miss                      │
//!                 ManualCookieInputPending ─parsed──────────┘
//!                          └─empty/unparsable → Failed
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, instrument, warn};

use crate::auth::{
    AuthStateStore, CookieJar, CookieJarHandle, StoreError, ValidityChecker,
    parse_manual_cookie_input,
};
use crate::config::AcquisitionSettings;
use crate::extract::{AcquisitionAttempt, ProbeContext, StrategySet};
use crate::interaction::UserInteractionPort;

use super::browser::BrowserLauncher;

/// Question asked once the polling deadline passes.
pub const LOGIN_CONFIRM_PROMPT: &str = "Have you completed the login process in the browser?";

/// Instructions shown when asking for pasted cookies.
pub const MANUAL_INPUT_INSTRUCTIONS: &str = "\
Automatic cookie extraction failed. Open your browser's developer tools on the
service, copy its cookies and paste them below, then press Enter on an empty line.
Accepted: a JSON array or object, a cookies.txt / DevTools table, or name=value lines.";

/// States of one acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    CheckingExisting,
    OpeningExternalLogin,
    PollingExtraction,
    ManualConfirmPending,
    ManualCookieInputPending,
    Persisting,
    Succeeded,
    Failed,
    Cancelled,
}

impl AcquisitionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Why an acquisition cycle did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("no session cookies found yet")]
    NotFoundYet,
    #[error("failed to save session: {0}")]
    IoFailure(#[source] StoreError),
    #[error("login cancelled")]
    UserCancelled,
    #[error("could not open a browser for login: {0}")]
    NoBrowserAvailable(String),
    #[error("manual cookie input rejected: {0}")]
    ManualInputInvalid(String),
    #[error("login was not completed in the browser")]
    LoginDeclined,
}

/// Final result of a cycle plus its audit trail.
#[derive(Debug)]
pub struct AcquisitionReport {
    pub result: Result<CookieJar, AcquisitionError>,
    /// Every state entered, in order, starting with `Idle`.
    pub states: Vec<AcquisitionState>,
    /// Every strategy attempt made, in order.
    pub attempts: Vec<AcquisitionAttempt>,
}

impl AcquisitionReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    #[must_use]
    pub fn cookies(&self) -> Option<&CookieJar> {
        self.result.as_ref().ok()
    }

    #[must_use]
    pub fn error(&self) -> Option<&AcquisitionError> {
        self.result.as_ref().err()
    }

    /// Last state entered.
    #[must_use]
    pub fn final_state(&self) -> AcquisitionState {
        self.states
            .last()
            .copied()
            .unwrap_or(AcquisitionState::Idle)
    }

    /// True when an already-valid stored session was reused.
    #[must_use]
    pub fn reused_existing(&self) -> bool {
        self.is_success() && !self.states.contains(&AcquisitionState::Persisting)
    }

    /// Human-readable one-line summary.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.result {
            Ok(_) if self.reused_existing() => "Already logged in".to_string(),
            Ok(jar) => format!("Logged in ({} cookies saved)", jar.len()),
            Err(error) => error.to_string(),
        }
    }
}

impl fmt::Display for AcquisitionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Shared collaborators for acquisition cycles.
#[derive(Clone)]
pub struct AcquisitionContext {
    pub store: AuthStateStore,
    pub validity: ValidityChecker,
    pub strategies: Arc<StrategySet>,
    pub probe: ProbeContext,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub active: CookieJarHandle,
    pub settings: AcquisitionSettings,
    pub delete_stale_sessions: bool,
}

impl fmt::Debug for AcquisitionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionContext")
            .field("store", &self.store)
            .field("strategies", &self.strategies)
            .field("probe", &self.probe)
            .field("settings", &self.settings)
            .field("delete_stale_sessions", &self.delete_stale_sessions)
            .finish_non_exhaustive()
    }
}

/// Drives one acquisition cycle. Consumed by [`Self::run`].
pub struct SessionAcquisitionController {
    ctx: AcquisitionContext,
    interaction: Arc<dyn UserInteractionPort>,
    states: Vec<AcquisitionState>,
    attempts: Vec<AcquisitionAttempt>,
}

impl fmt::Debug for SessionAcquisitionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAcquisitionController")
            .field("states", &self.states)
            .field("attempts", &self.attempts.len())
            .finish_non_exhaustive()
    }
}

impl SessionAcquisitionController {
    #[must_use]
    pub fn new(ctx: AcquisitionContext, interaction: Arc<dyn UserInteractionPort>) -> Self {
        Self {
            ctx,
            interaction,
            states: vec![AcquisitionState::Idle],
            attempts: Vec::new(),
        }
    }

    /// Runs the full cycle to a terminal state.
    #[instrument(level = "debug", skip(self), fields(target = %self.ctx.probe.target.domain()))]
    pub async fn run(mut self) -> AcquisitionReport {
        let result = self.drive().await;
        self.finish(result)
    }

    /// Runs a manual-input-only cycle with already supplied text.
    #[instrument(level = "debug", skip(self, input))]
    pub fn run_import(mut self, input: &str) -> AcquisitionReport {
        self.enter(AcquisitionState::ManualCookieInputPending);
        let result = match self.parse_manual(Some(input)) {
            Ok(jar) => self.persist(jar),
            Err(error) => Err(error),
        };
        self.finish(result)
    }

    async fn drive(&mut self) -> Result<CookieJar, AcquisitionError> {
        self.enter(AcquisitionState::CheckingExisting);
        if let Some(jar) = self.existing_session() {
            info!(cookies = jar.len(), "Reusing valid stored session");
            self.ctx.active.replace(jar.clone());
            return Ok(jar);
        }
        if let Ok(jar) = self.sweep().await {
            return self.persist(jar);
        }

        self.enter(AcquisitionState::OpeningExternalLogin);
        let login_url = self.ctx.probe.target.login_url();
        self.ctx
            .launcher
            .open(&login_url)
            .await
            .map_err(|error| AcquisitionError::NoBrowserAvailable(error.to_string()))?;

        self.enter(AcquisitionState::PollingExtraction);
        if let Some(jar) = self.poll().await? {
            return self.persist(jar);
        }

        self.enter(AcquisitionState::ManualConfirmPending);
        if !self.interaction.confirm(LOGIN_CONFIRM_PROMPT).await {
            return Err(AcquisitionError::LoginDeclined);
        }
        if let Ok(jar) = self.sweep().await {
            return self.persist(jar);
        }

        self.enter(AcquisitionState::ManualCookieInputPending);
        let input = self
            .interaction
            .request_manual_input(MANUAL_INPUT_INSTRUCTIONS)
            .await;
        let jar = self.parse_manual(input.as_deref())?;
        self.persist(jar)
    }

    /// Polls every check interval until the login timeout.
    ///
    /// `Ok(None)` means the deadline passed without a hit.
    async fn poll(&mut self) -> Result<Option<CookieJar>, AcquisitionError> {
        let AcquisitionSettings {
            login_timeout,
            check_interval,
        } = self.ctx.settings;
        let started = Instant::now();
        let deadline = started + login_timeout;

        loop {
            if self.interaction.is_cancelled() {
                info!("Login cancelled during polling");
                return Err(AcquisitionError::UserCancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let remaining = deadline - now;
            self.interaction.report_progress(
                progress_percent(now - started, login_timeout),
                &format!(
                    "Waiting for login in browser... {}s remaining",
                    remaining.as_secs()
                ),
            );

            if let Some(jar) = self.bounded_sweep(deadline, check_interval).await? {
                return Ok(Some(jar));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(check_interval.min(remaining)).await;
        }

        self.interaction
            .report_progress(100, "Timed out waiting for login");
        debug!(timeout_secs = login_timeout.as_secs(), "Polling deadline reached");
        Ok(None)
    }

    /// One sweep that ends at `deadline` or as soon as the user cancels.
    ///
    /// The cancel flag is rechecked every `check_interval` while a strategy
    /// is in flight.
    async fn bounded_sweep(
        &mut self,
        deadline: Instant,
        check_interval: Duration,
    ) -> Result<Option<CookieJar>, AcquisitionError> {
        let interaction = self.interaction.as_ref();
        let sweep = self.ctx.strategies.run_until(
            &self.ctx.probe,
            &mut self.attempts,
            || interaction.is_cancelled() || Instant::now() >= deadline,
        );

        tokio::select! {
            biased;
            () = async {
                while !interaction.is_cancelled() {
                    sleep(check_interval).await;
                }
            } => {
                info!("Login cancelled during an extraction sweep");
                Err(AcquisitionError::UserCancelled)
            }
            found = timeout_at(deadline, sweep) => {
                if found.is_err() {
                    debug!("Extraction sweep cut off at the login deadline");
                }
                Ok(found.ok().flatten())
            }
        }
    }

    /// One pass over all strategies, stopping early if the user cancels.
    async fn sweep(&mut self) -> Result<CookieJar, AcquisitionError> {
        let interaction = self.interaction.as_ref();
        self.ctx
            .strategies
            .run_until(&self.ctx.probe, &mut self.attempts, || {
                interaction.is_cancelled()
            })
            .await
            .ok_or(AcquisitionError::NotFoundYet)
    }

    fn existing_session(&self) -> Option<CookieJar> {
        let store = &self.ctx.store;
        let record = match store.load() {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(error) => {
                warn!(error = %error, "Stored session record is unreadable; ignoring it");
                return None;
            }
        };

        if !self.ctx.validity.is_valid(&record, store.cookie_jar_present()) {
            info!(
                age_millis = self.ctx.validity.age_millis(&record),
                "Stored session is stale"
            );
            if self.ctx.delete_stale_sessions {
                match store.clear() {
                    Ok(()) => info!("Deleted stale session files"),
                    Err(error) => warn!(error = %error, "Failed to delete stale session files"),
                }
            }
            return None;
        }

        let jar = store.load_cookies();
        if jar.is_empty() {
            warn!("Stored session has no readable cookies; ignoring it");
            return None;
        }
        Some(jar)
    }

    fn parse_manual(&self, input: Option<&str>) -> Result<CookieJar, AcquisitionError> {
        let Some(input) = input else {
            return Err(AcquisitionError::ManualInputInvalid(
                "no cookie input provided".to_string(),
            ));
        };
        let captured = parse_manual_cookie_input(input, self.ctx.probe.target.domain())
            .map_err(|error| AcquisitionError::ManualInputInvalid(error.to_string()))?;
        for warning in &captured.warnings {
            debug!(warning = %warning, "Manual cookie input warning");
        }
        if !captured.cookies.has_auth_cookies() {
            warn!(
                names = ?captured.cookies.names(),
                "Manual input has no recognisable auth cookie; saving it anyway"
            );
        }
        info!(
            format = captured.format.as_str(),
            cookies = captured.cookies.len(),
            "Parsed manual cookie input"
        );
        Ok(captured.cookies)
    }

    fn persist(&mut self, jar: CookieJar) -> Result<CookieJar, AcquisitionError> {
        self.enter(AcquisitionState::Persisting);
        self.ctx
            .store
            .save(&jar)
            .map_err(AcquisitionError::IoFailure)?;
        self.ctx.active.replace(jar.clone());
        Ok(jar)
    }

    fn enter(&mut self, state: AcquisitionState) {
        debug!(state = ?state, "Acquisition state");
        self.states.push(state);
    }

    fn finish(mut self, result: Result<CookieJar, AcquisitionError>) -> AcquisitionReport {
        let terminal = match &result {
            Ok(_) => AcquisitionState::Succeeded,
            Err(AcquisitionError::UserCancelled) => AcquisitionState::Cancelled,
            Err(_) => AcquisitionState::Failed,
        };
        self.enter(terminal);
        match &result {
            Ok(jar) => info!(cookies = jar.len(), "Session acquisition succeeded"),
            Err(error) => warn!(error = %error, "Session acquisition did not succeed"),
        }
        AcquisitionReport {
            result,
            states: self.states,
            attempts: self.attempts,
        }
    }
}

fn progress_percent(elapsed: Duration, total: Duration) -> u8 {
    if total.is_zero() {
        return 100;
    }
    let percent = elapsed.as_millis().saturating_mul(100) / total.as_millis().max(1);
    u8::try_from(percent.min(100)).unwrap_or(100)
}
