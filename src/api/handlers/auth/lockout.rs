//! Account lockout state machine.
//!
//! Lock state is derived from two persisted account fields
//! (`failed_attempts`, `locked_until`); there is no timer or background job.
//! An expired lock simply stops matching at the next attempt and is cleared
//! on the next successful login or explicit activation.

use chrono::{DateTime, Duration, Utc};

use super::storage::User;

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    /// Failed attempts before the account is locked.
    pub max_attempts: u32,
    /// How long a triggered lock lasts.
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked { until: DateTime<Utc> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Counter incremented, account still unlocked.
    Counted { failed_attempts: i32 },
    /// Threshold reached: account locked, counter reset.
    LockedOut { until: DateTime<Utc> },
}

/// Derive the current lock state; a lock in the past has no effect.
#[must_use]
pub fn lock_state(user: &User, now: DateTime<Utc>) -> LockState {
    match user.locked_until {
        Some(until) if until > now => LockState::Locked { until },
        _ => LockState::Unlocked,
    }
}

/// Apply a failed login attempt to the account fields.
///
/// Callers must only invoke this while the account is `Unlocked`; attempts
/// against a locked account are rejected earlier without counting.
pub fn register_failure(user: &mut User, now: DateTime<Utc>, policy: &LockoutPolicy) -> FailureOutcome {
    let attempts = user.failed_attempts.saturating_add(1);

    if attempts >= i32::try_from(policy.max_attempts).unwrap_or(i32::MAX) {
        let until = now + policy.lockout_duration;
        user.failed_attempts = 0;
        user.locked_until = Some(until);
        FailureOutcome::LockedOut { until }
    } else {
        user.failed_attempts = attempts;
        FailureOutcome::Counted {
            failed_attempts: attempts,
        }
    }
}

/// Apply a successful login: counter and lock are both cleared.
pub fn register_success(user: &mut User) {
    user.failed_attempts = 0;
    user.locked_until = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_user() -> User {
        User::new(Uuid::new_v4(), "user@example.com".to_string(), "$argon2$x".to_string())
    }

    #[test]
    fn fresh_account_is_unlocked() {
        let user = test_user();
        assert_eq!(lock_state(&user, Utc::now()), LockState::Unlocked);
    }

    #[test]
    fn failures_below_threshold_only_count() {
        let mut user = test_user();
        let now = Utc::now();
        let policy = LockoutPolicy::default();

        for expected in 1..=4 {
            let outcome = register_failure(&mut user, now, &policy);
            assert_eq!(
                outcome,
                FailureOutcome::Counted {
                    failed_attempts: expected
                }
            );
        }
        assert_eq!(user.failed_attempts, 4);
        assert_eq!(user.locked_until, None);
    }

    #[test]
    fn fifth_failure_locks_and_resets_counter() {
        let mut user = test_user();
        let now = Utc::now();
        let policy = LockoutPolicy::default();

        for _ in 0..4 {
            register_failure(&mut user, now, &policy);
        }
        let outcome = register_failure(&mut user, now, &policy);

        let until = now + policy.lockout_duration;
        assert_eq!(outcome, FailureOutcome::LockedOut { until });
        assert_eq!(user.failed_attempts, 0);
        assert_eq!(user.locked_until, Some(until));
        assert_eq!(lock_state(&user, now), LockState::Locked { until });
    }

    #[test]
    fn expired_lock_is_unlocked_lazily() {
        let mut user = test_user();
        let now = Utc::now();
        user.locked_until = Some(now - Duration::seconds(1));

        assert_eq!(lock_state(&user, now), LockState::Unlocked);
        // Not auto-cleared: the field stays until the next success or activation.
        assert!(user.locked_until.is_some());
    }

    #[test]
    fn success_clears_counter_and_lock() {
        let mut user = test_user();
        user.failed_attempts = 3;
        user.locked_until = Some(Utc::now() + Duration::minutes(5));

        register_success(&mut user);

        assert_eq!(user.failed_attempts, 0);
        assert_eq!(user.locked_until, None);
    }

    #[test]
    fn custom_threshold_applies() {
        let mut user = test_user();
        let now = Utc::now();
        let policy = LockoutPolicy {
            max_attempts: 2,
            lockout_duration: Duration::minutes(1),
        };

        register_failure(&mut user, now, &policy);
        let outcome = register_failure(&mut user, now, &policy);
        assert!(matches!(outcome, FailureOutcome::LockedOut { .. }));
    }
}
