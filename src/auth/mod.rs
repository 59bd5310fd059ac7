//! Session credential model, persistence, validity policy and manual capture.
//!
//! - [`cookies`] - [`SessionCredential`], [`CookieJar`], [`CookieJarHandle`]
//! - [`storage`] - [`AuthStateStore`] (`auth.json` + `cookies.json`)
//! - [`validity`] - [`ValidityChecker`] with an injectable [`Clock`]
//! - [`capture`] - manual cookie input parsing

mod capture;
mod cookies;
mod storage;
mod validity;

pub use capture::{CaptureError, CapturedCookieFormat, CapturedCookies, parse_manual_cookie_input};
pub use cookies::{
    AUTH_COOKIE_ALLOW_LIST, CookieJar, CookieJarHandle, SessionCredential, is_auth_cookie_name,
    load_cookies_into_jar,
};
pub use storage::{
    AuthRecord, AuthStateStore, DATA_DIR_ENV, StoreError, default_data_dir, epoch_millis_now,
};
pub use validity::{Clock, SESSION_MAX_AGE_MILLIS, SystemClock, ValidityChecker, is_valid_at};
