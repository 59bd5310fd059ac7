//! Session validity policy.

use std::fmt;
use std::sync::Arc;

use super::AuthRecord;
use super::storage::epoch_millis_now;

/// Maximum session age: 30 days in milliseconds.
pub const SESSION_MAX_AGE_MILLIS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Source of wall-clock time, injectable for tests.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_epoch_millis(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_millis(&self) -> i64 {
        epoch_millis_now()
    }
}

/// Decides whether persisted session state is still usable.
#[derive(Clone)]
pub struct ValidityChecker {
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ValidityChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidityChecker").finish_non_exhaustive()
    }
}

impl Default for ValidityChecker {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ValidityChecker {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Returns true iff the cookie file is present and the record is younger
    /// than 30 days.
    #[must_use]
    pub fn is_valid(&self, record: &AuthRecord, cookie_jar_present: bool) -> bool {
        is_valid_at(record, cookie_jar_present, self.clock.now_epoch_millis())
    }

    /// Age of the record in milliseconds; future timestamps count as age 0.
    #[must_use]
    pub fn age_millis(&self, record: &AuthRecord) -> i64 {
        age_millis_at(record, self.clock.now_epoch_millis())
    }
}

/// Pure validity policy evaluated at `now_epoch_millis`.
#[must_use]
pub fn is_valid_at(record: &AuthRecord, cookie_jar_present: bool, now_epoch_millis: i64) -> bool {
    cookie_jar_present && age_millis_at(record, now_epoch_millis) < SESSION_MAX_AGE_MILLIS
}

fn age_millis_at(record: &AuthRecord, now_epoch_millis: i64) -> i64 {
    now_epoch_millis
        .saturating_sub(record.created_at_epoch_millis)
        .max(0)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    struct FixedClock(AtomicI64);

    impl Clock for FixedClock {
        fn now_epoch_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn record(created: i64) -> AuthRecord {
        AuthRecord {
            created_at_epoch_millis: created,
            cookie_jar_ref: PathBuf::from("cookies.json"),
        }
    }

    #[test]
    fn test_absent_jar_is_never_valid() {
        for created in [0, 1_000, SESSION_MAX_AGE_MILLIS, i64::MAX] {
            assert!(!is_valid_at(&record(created), false, created));
            assert!(!is_valid_at(&record(created), false, 0));
        }
    }

    #[test]
    fn test_boundary_just_below_thirty_days_is_valid() {
        let created = 1_700_000_000_000;
        let now = created + SESSION_MAX_AGE_MILLIS - 1;
        assert!(is_valid_at(&record(created), true, now));
    }

    #[test]
    fn test_boundary_at_thirty_days_is_invalid() {
        let created = 1_700_000_000_000;
        assert!(!is_valid_at(
            &record(created),
            true,
            created + SESSION_MAX_AGE_MILLIS
        ));
        assert!(!is_valid_at(
            &record(created),
            true,
            created + SESSION_MAX_AGE_MILLIS + 1
        ));
    }

    #[test]
    fn test_future_record_counts_as_fresh() {
        assert!(is_valid_at(&record(10_000), true, 0));
    }

    #[test]
    fn test_checker_uses_injected_clock() {
        let clock = Arc::new(FixedClock(AtomicI64::new(5_000)));
        let checker = ValidityChecker::new(clock.clone());
        let rec = record(5_000);
        assert!(checker.is_valid(&rec, true));
        assert_eq!(checker.age_millis(&rec), 0);

        clock.0.store(5_000 + SESSION_MAX_AGE_MILLIS, Ordering::SeqCst);
        assert!(!checker.is_valid(&rec, true));
    }
}
