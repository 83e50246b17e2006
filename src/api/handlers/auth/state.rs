//! Auth configuration and shared state.

use chrono::Duration;
use std::sync::Arc;

use crate::api::email::EmailSender;

use super::credentials::TokenSigner;
use super::events::EventSink;
use super::lockout::LockoutPolicy;
use super::rate_limit::RateLimiter;
use super::storage::UserRepository;

const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_DURATION_MINUTES: i64 = 15;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    max_login_attempts: u32,
    lockout_duration_minutes: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_duration_minutes: DEFAULT_LOCKOUT_DURATION_MINUTES,
        }
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_duration_minutes(mut self, minutes: i64) -> Self {
        self.lockout_duration_minutes = minutes;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_attempts: self.max_login_attempts,
            lockout_duration: Duration::minutes(self.lockout_duration_minutes),
        }
    }
}

/// Everything the auth and user-management handlers need, injected once at
/// startup. Tests construct this with the in-memory repository and whatever
/// limiter/sink the scenario calls for.
pub struct AuthState {
    config: AuthConfig,
    users: Arc<dyn UserRepository>,
    tokens: TokenSigner,
    rate_limiter: Arc<dyn RateLimiter>,
    email_sender: Arc<dyn EmailSender>,
    events: Arc<dyn EventSink>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserRepository>,
        tokens: TokenSigner,
        rate_limiter: Arc<dyn RateLimiter>,
        email_sender: Arc<dyn EmailSender>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            users,
            tokens,
            rate_limiter,
            email_sender,
            events,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserRepository {
        self.users.as_ref()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenSigner {
        &self.tokens
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(crate) fn email_sender(&self) -> Arc<dyn EmailSender> {
        Arc::clone(&self.email_sender)
    }

    pub(crate) fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("http://localhost:3000".to_string());

        assert_eq!(config.frontend_base_url(), "http://localhost:3000");
        assert_eq!(config.lockout_policy().max_attempts, 5);
        assert_eq!(
            config.lockout_policy().lockout_duration,
            Duration::minutes(15)
        );

        let config = config
            .with_max_login_attempts(3)
            .with_lockout_duration_minutes(30);

        assert_eq!(config.lockout_policy().max_attempts, 3);
        assert_eq!(
            config.lockout_policy().lockout_duration,
            Duration::minutes(30)
        );
    }
}
