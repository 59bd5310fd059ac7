//! v0-session Library
//!
//! Acquires and maintains an authenticated browser session (cookies) for the
//! v0.dev web application on behalf of local tools, without driving a browser
//! engine.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`auth`] - Cookie model, on-disk session state, validity policy, manual capture
//! - [`extract`] - Priority-ordered cookie extraction strategies
//! - [`interaction`] - Abstract user interaction (progress, confirm, manual input)
//! - [`session`] - Acquisition state machine, browser launcher, [`SessionManager`]
//! - [`config`] - Defaults, TOML config file, resolved settings
//! - [`target`] - Target service URLs and cookie domain

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod extract;
pub mod interaction;
pub mod session;
pub mod target;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use auth::{
    AuthRecord, AuthStateStore, CookieJar, CookieJarHandle, SessionCredential, StoreError,
    ValidityChecker,
};
pub use config::{LoadedConfig, Settings, load_config};
pub use extract::{ProbeContext, ProbeOutcome, StrategySet, build_default_strategy_set};
pub use interaction::{CancellationFlag, HeadlessInteraction, UserInteractionPort};
pub use session::{
    AcquisitionError, AcquisitionReport, AcquisitionState, SessionError, SessionManager,
};
pub use target::TargetService;
