//! Rate limiting primitives for auth flows.
//!
//! Counters are process-local and reset on restart; there is no cross-instance
//! coordination. The limiter protects the service from one client hammering
//! many accounts, while account lockout protects one account from any client.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Register,
    Login,
    VerifyEmail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, key: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _key: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// Requests allowed per client per 60-second window, per action.
#[derive(Clone, Copy, Debug)]
pub struct RateLimits {
    pub register_per_minute: u32,
    pub login_per_minute: u32,
    pub verify_email_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            register_per_minute: 5,
            login_per_minute: 10,
            verify_email_per_minute: 30,
        }
    }
}

impl RateLimits {
    const fn threshold(&self, action: RateLimitAction) -> u32 {
        match action {
            RateLimitAction::Register => self.register_per_minute,
            RateLimitAction::Login => self.login_per_minute,
            RateLimitAction::VerifyEmail => self.verify_email_per_minute,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window counter per (client key, action).
///
/// The whole map sits behind one mutex so concurrent bursts cannot
/// undercount. Stale windows are pruned on insertion, same as the expired
/// login-state cleanup elsewhere in the stack.
pub struct FixedWindowRateLimiter {
    limits: RateLimits,
    window: Duration,
    windows: Mutex<HashMap<(String, RateLimitAction), Window>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            window: Duration::from_secs(60),
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn check_at(&self, key: &str, action: RateLimitAction, now: Instant) -> RateLimitDecision {
        let threshold = self.limits.threshold(action);
        if threshold == 0 {
            return RateLimitDecision::Limited;
        }

        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned mutex means a panic elsewhere; fail open rather than
            // reject every request from here on.
            return RateLimitDecision::Allowed;
        };

        windows.retain(|_, window| now.duration_since(window.started_at) < self.window);

        let window = windows
            .entry((key.to_string(), action))
            .or_insert(Window {
                started_at: now,
                count: 0,
            });

        if window.count >= threshold {
            return RateLimitDecision::Limited;
        }

        window.count += 1;
        RateLimitDecision::Allowed
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, key: &str, action: RateLimitAction) -> RateLimitDecision {
        self.check_at(key, action, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check("1.2.3.4", RateLimitAction::Register),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check("1.2.3.4", RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn allows_up_to_threshold_then_limits() {
        let limiter = FixedWindowRateLimiter::new(RateLimits {
            register_per_minute: 3,
            login_per_minute: 10,
            verify_email_per_minute: 30,
        });
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(
                limiter.check_at("1.2.3.4", RateLimitAction::Register, now),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check_at("1.2.3.4", RateLimitAction::Register, now),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn different_clients_do_not_interfere() {
        let limiter = FixedWindowRateLimiter::new(RateLimits {
            register_per_minute: 1,
            login_per_minute: 10,
            verify_email_per_minute: 30,
        });
        let now = Instant::now();

        assert_eq!(
            limiter.check_at("1.2.3.4", RateLimitAction::Register, now),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_at("1.2.3.4", RateLimitAction::Register, now),
            RateLimitDecision::Limited
        );
        assert_eq!(
            limiter.check_at("5.6.7.8", RateLimitAction::Register, now),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn actions_are_tracked_independently() {
        let limiter = FixedWindowRateLimiter::new(RateLimits {
            register_per_minute: 1,
            login_per_minute: 1,
            verify_email_per_minute: 30,
        });
        let now = Instant::now();

        assert_eq!(
            limiter.check_at("1.2.3.4", RateLimitAction::Register, now),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_at("1.2.3.4", RateLimitAction::Login, now),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_expiry_resets_counters() {
        let limiter = FixedWindowRateLimiter::new(RateLimits {
            register_per_minute: 1,
            login_per_minute: 10,
            verify_email_per_minute: 30,
        });
        let now = Instant::now();

        assert_eq!(
            limiter.check_at("1.2.3.4", RateLimitAction::Register, now),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_at("1.2.3.4", RateLimitAction::Register, now),
            RateLimitDecision::Limited
        );

        let later = now + Duration::from_secs(61);
        assert_eq!(
            limiter.check_at("1.2.3.4", RateLimitAction::Register, later),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn zero_threshold_always_limits() {
        let limiter = FixedWindowRateLimiter::new(RateLimits {
            register_per_minute: 0,
            login_per_minute: 10,
            verify_email_per_minute: 30,
        });
        assert_eq!(
            limiter.check("1.2.3.4", RateLimitAction::Register),
            RateLimitDecision::Limited
        );
    }
}
