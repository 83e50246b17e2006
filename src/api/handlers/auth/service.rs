//! Authentication orchestrator.
//!
//! Composes the rate limiter, repository, lockout state machine, and
//! credential store into the registration, verification, and login protocols.
//! All domain failures surface as `AuthError` and are translated to HTTP at
//! this boundary; internal errors are logged with context and leave the
//! process as a generic 500.

use axum::{
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use tracing::error;
use uuid::Uuid;

use crate::api::email::VerificationEmail;

use super::credentials::{hash_password, verify_password};
use super::events::{SecurityEvent, SecurityEventType};
use super::lockout::{self, FailureOutcome, LockState};
use super::policy::validate_password;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::StoreError;
use super::types::ErrorResponse;
use super::utils::{build_verify_url, extract_client_ip, generate_verification_token, valid_email};

/// Client context carried into security events.
#[derive(Clone, Debug, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
}

impl RequestMeta {
    /// Capture client context from the request headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, endpoint: &str) -> Self {
        Self {
            ip_address: extract_client_ip(headers),
            user_agent: headers
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            endpoint: Some(endpoint.to_string()),
        }
    }

    fn client_key(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("unknown")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{}", .0.join("; "))]
    WeakPassword(Vec<String>),
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("User with this email already exists")]
    DuplicateEmail,
    #[error("Incorrect credentials")]
    InvalidCredentials,
    #[error("Email not verified")]
    EmailNotVerified,
    #[error("Account locked until {}", .until.to_rfc3339())]
    AccountLocked { until: DateTime<Utc> },
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Could not validate credentials")]
    Unauthorized,
    #[error("Invalid verification token")]
    InvalidToken,
    #[error("Not enough permissions")]
    Forbidden,
    #[error("User not found")]
    NotFound,
    #[error("{0}")]
    InvariantViolation(&'static str),
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::WeakPassword(_)
            | Self::InvalidEmail
            | Self::DuplicateEmail
            | Self::InvalidToken
            | Self::InvariantViolation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::EmailNotVerified | Self::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            Self::AccountLocked { .. } | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => Self::DuplicateEmail,
            StoreError::Other(err) => Self::Internal(err),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            // Full context stays in the logs; the caller only sees a generic body.
            error!("request failed: {err:#}");
        }
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Signed token pair returned by a successful login.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn rate_limit_event(state: &AuthState, meta: &RequestMeta) {
    state.events().emit(
        &SecurityEvent::new(SecurityEventType::RateLimitExceeded, false)
            .with_ip_address(meta.ip_address.clone())
            .with_user_agent(meta.user_agent.clone())
            .with_endpoint(meta.endpoint.clone())
            .with_details("Rate limit exceeded"),
    );
}

fn check_rate_limit(
    state: &AuthState,
    meta: &RequestMeta,
    action: RateLimitAction,
) -> Result<(), AuthError> {
    if state.rate_limiter().check(meta.client_key(), action) == RateLimitDecision::Limited {
        rate_limit_event(state, meta);
        return Err(AuthError::RateLimited);
    }
    Ok(())
}

/// Register a new account and dispatch its verification email.
///
/// # Errors
/// `RateLimited`, `InvalidEmail`, `WeakPassword` (all violations at once),
/// `DuplicateEmail`, or `Internal`.
pub async fn register(
    state: &AuthState,
    meta: &RequestMeta,
    email: &str,
    password: &str,
) -> Result<Uuid, AuthError> {
    check_rate_limit(state, meta, RateLimitAction::Register)?;

    if !valid_email(email) {
        return Err(AuthError::InvalidEmail);
    }

    let violations = validate_password(password);
    if !violations.is_empty() {
        return Err(AuthError::WeakPassword(violations));
    }

    let password_hash = hash_password(password).map_err(AuthError::Internal)?;
    let mut user = state.users().create(email, &password_hash).await?;

    let token = generate_verification_token().map_err(AuthError::Internal)?;
    user.email_verification_token = Some(token.clone());
    state.users().update(&user).await?;

    // Best-effort: a failing sender is logged, registration stands.
    crate::api::email::dispatch_verification_email(
        state.email_sender(),
        VerificationEmail {
            to_email: user.email.clone(),
            verify_url: build_verify_url(state.config().frontend_base_url(), &token),
        },
    );

    state.events().emit(
        &SecurityEvent::new(SecurityEventType::Registration, true)
            .with_user_id(user.id)
            .with_email(user.email.clone())
            .with_ip_address(meta.ip_address.clone())
            .with_user_agent(meta.user_agent.clone()),
    );

    Ok(user.id)
}

/// Consume a verification token, marking the account verified.
///
/// Reuse fails the same way as an unknown token: once consumed, the token is
/// gone.
///
/// # Errors
/// `RateLimited`, `InvalidToken`, or `Internal`.
pub async fn verify_email(
    state: &AuthState,
    meta: &RequestMeta,
    token: &str,
) -> Result<(), AuthError> {
    check_rate_limit(state, meta, RateLimitAction::VerifyEmail)?;

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    let Some(user) = state.users().consume_verification_token(token).await? else {
        return Err(AuthError::InvalidToken);
    };

    state.events().emit(
        &SecurityEvent::new(SecurityEventType::EmailVerified, true)
            .with_user_id(user.id)
            .with_email(user.email)
            .with_ip_address(meta.ip_address.clone())
            .with_user_agent(meta.user_agent.clone()),
    );

    Ok(())
}

fn auth_failure_event(state: &AuthState, meta: &RequestMeta, email: &str, details: &str) {
    state.events().emit(
        &SecurityEvent::new(SecurityEventType::AuthFailure, false)
            .with_email(email)
            .with_ip_address(meta.ip_address.clone())
            .with_user_agent(meta.user_agent.clone())
            .with_details(details),
    );
}

/// Authenticate and issue an access/refresh token pair.
///
/// Unknown accounts and wrong passwords are indistinguishable to the caller.
///
/// # Errors
/// `RateLimited`, `AccountLocked`, `InvalidCredentials`, `EmailNotVerified`,
/// or `Internal`.
pub async fn login(
    state: &AuthState,
    meta: &RequestMeta,
    email: &str,
    password: &str,
) -> Result<TokenPair, AuthError> {
    check_rate_limit(state, meta, RateLimitAction::Login)?;

    let Some(mut user) = state.users().get_by_email(email).await? else {
        auth_failure_event(state, meta, email, "Unknown account");
        return Err(AuthError::InvalidCredentials);
    };

    let now = Utc::now();
    if let LockState::Locked { until } = lockout::lock_state(&user, now) {
        // No credential check, no counter change while locked.
        auth_failure_event(state, meta, email, "Account locked");
        return Err(AuthError::AccountLocked { until });
    }

    if !verify_password(password, &user.password_hash) {
        let outcome = lockout::register_failure(&mut user, now, &state.config().lockout_policy());
        state.users().update(&user).await?;

        match outcome {
            FailureOutcome::LockedOut { .. } => {
                state.events().emit(
                    &SecurityEvent::new(SecurityEventType::AccountLockout, false)
                        .with_user_id(user.id)
                        .with_email(user.email.clone())
                        .with_ip_address(meta.ip_address.clone())
                        .with_user_agent(meta.user_agent.clone())
                        .with_details("Account locked due to multiple failed attempts"),
                );
            }
            FailureOutcome::Counted { .. } => {
                auth_failure_event(state, meta, email, "Invalid password");
            }
        }
        return Err(AuthError::InvalidCredentials);
    }

    if !user.active {
        auth_failure_event(state, meta, email, "Account deactivated");
        return Err(AuthError::InvalidCredentials);
    }

    if !user.email_verified {
        // Counters untouched: the credential was correct.
        auth_failure_event(state, meta, email, "Email not verified");
        return Err(AuthError::EmailNotVerified);
    }

    lockout::register_success(&mut user);
    state.users().update(&user).await?;

    let subject = user.id.to_string();
    let access_token = state
        .tokens()
        .issue_access_token(&subject, None)
        .map_err(AuthError::Internal)?;
    let refresh_token = state
        .tokens()
        .issue_refresh_token(&subject, None)
        .map_err(AuthError::Internal)?;

    state.events().emit(
        &SecurityEvent::new(SecurityEventType::AuthSuccess, true)
            .with_user_id(user.id)
            .with_email(user.email)
            .with_ip_address(meta.ip_address.clone())
            .with_user_agent(meta.user_agent.clone()),
    );

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogEmailSender;
    use crate::api::handlers::auth::credentials::TokenSigner;
    use crate::api::handlers::auth::events::RecordingEventSink;
    use crate::api::handlers::auth::rate_limit::{
        FixedWindowRateLimiter, NoopRateLimiter, RateLimiter, RateLimits,
    };
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::api::handlers::auth::storage::{MemoryUserRepository, UserRepository};
    use chrono::Duration;
    use secrecy::SecretString;
    use std::sync::Arc;

    const EMAIL: &str = "alice@example.com";
    const PASSWORD: &str = "StrongPassw0rd!";

    struct Harness {
        state: AuthState,
        users: Arc<MemoryUserRepository>,
        events: Arc<RecordingEventSink>,
    }

    fn harness_with_limiter(rate_limiter: Arc<dyn RateLimiter>) -> Harness {
        let users = Arc::new(MemoryUserRepository::new());
        let events = Arc::new(RecordingEventSink::default());
        let tokens = TokenSigner::new(
            SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
            "HS256",
            15,
            7,
        )
        .expect("signer should build");

        let state = AuthState::new(
            AuthConfig::new("http://localhost:3000".to_string()),
            users.clone(),
            tokens,
            rate_limiter,
            Arc::new(LogEmailSender),
            events.clone(),
        );

        Harness {
            state,
            users,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with_limiter(Arc::new(NoopRateLimiter))
    }

    async fn register_and_verify(harness: &Harness) -> Uuid {
        let meta = RequestMeta::default();
        let user_id = register(&harness.state, &meta, EMAIL, PASSWORD)
            .await
            .expect("register should work");
        let token = harness
            .users
            .get(user_id)
            .await
            .expect("get should work")
            .expect("user should exist")
            .email_verification_token
            .expect("token should be set");
        verify_email(&harness.state, &meta, &token)
            .await
            .expect("verify should work");
        user_id
    }

    #[tokio::test]
    async fn register_then_verify_then_login() {
        let harness = harness();
        let meta = RequestMeta::default();

        let user_id = register_and_verify(&harness).await;

        let user = harness
            .users
            .get(user_id)
            .await
            .expect("get should work")
            .expect("user should exist");
        assert!(user.email_verified);
        assert_eq!(user.email_verification_token, None);

        let pair = login(&harness.state, &meta, EMAIL, PASSWORD)
            .await
            .expect("login should work");
        assert_ne!(pair.access_token, pair.refresh_token);

        let types = harness.events.event_types();
        assert!(types.contains(&SecurityEventType::Registration));
        assert!(types.contains(&SecurityEventType::EmailVerified));
        assert!(types.contains(&SecurityEventType::AuthSuccess));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let harness = harness();
        let meta = RequestMeta::default();

        register(&harness.state, &meta, EMAIL, PASSWORD)
            .await
            .expect("register should work");
        let result = register(&harness.state, &meta, EMAIL, PASSWORD).await;
        assert!(matches!(result, Err(AuthError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn register_reports_all_policy_violations() {
        let harness = harness();
        let meta = RequestMeta::default();

        let result = register(&harness.state, &meta, EMAIL, "abc").await;
        let Err(AuthError::WeakPassword(violations)) = result else {
            panic!("expected WeakPassword");
        };
        assert_eq!(violations.len(), 4);
    }

    #[tokio::test]
    async fn register_rejects_invalid_email() {
        let harness = harness();
        let meta = RequestMeta::default();

        let result = register(&harness.state, &meta, "not-an-email", PASSWORD).await;
        assert!(matches!(result, Err(AuthError::InvalidEmail)));
    }

    #[tokio::test]
    async fn verify_email_fails_on_reuse() {
        let harness = harness();
        let meta = RequestMeta::default();

        let user_id = register(&harness.state, &meta, EMAIL, PASSWORD)
            .await
            .expect("register should work");
        let token = harness
            .users
            .get(user_id)
            .await
            .expect("get should work")
            .expect("user should exist")
            .email_verification_token
            .expect("token should be set");

        verify_email(&harness.state, &meta, &token)
            .await
            .expect("first verify should work");
        let again = verify_email(&harness.state, &meta, &token).await;
        assert!(matches!(again, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn login_unknown_account_is_invalid_credentials() {
        let harness = harness();
        let meta = RequestMeta::default();

        let result = login(&harness.state, &meta, "ghost@example.com", PASSWORD).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn login_unverified_rejects_without_mutation() {
        let harness = harness();
        let meta = RequestMeta::default();

        let user_id = register(&harness.state, &meta, EMAIL, PASSWORD)
            .await
            .expect("register should work");

        let result = login(&harness.state, &meta, EMAIL, PASSWORD).await;
        assert!(matches!(result, Err(AuthError::EmailNotVerified)));

        let user = harness
            .users
            .get(user_id)
            .await
            .expect("get should work")
            .expect("user should exist");
        assert_eq!(user.failed_attempts, 0);
        assert_eq!(user.locked_until, None);
    }

    #[tokio::test]
    async fn five_failures_lock_the_account() {
        let harness = harness();
        let meta = RequestMeta::default();

        register_and_verify(&harness).await;

        for _ in 0..5 {
            let result = login(&harness.state, &meta, EMAIL, "WrongPass1!").await;
            assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        }

        // Sixth attempt, correct password: still rejected, account is locked.
        let result = login(&harness.state, &meta, EMAIL, PASSWORD).await;
        assert!(matches!(result, Err(AuthError::AccountLocked { .. })));

        assert!(harness
            .events
            .event_types()
            .contains(&SecurityEventType::AccountLockout));
    }

    #[tokio::test]
    async fn expired_lock_allows_login_and_resets_counters() {
        let harness = harness();
        let meta = RequestMeta::default();

        let user_id = register_and_verify(&harness).await;

        let mut user = harness
            .users
            .get(user_id)
            .await
            .expect("get should work")
            .expect("user should exist");
        user.failed_attempts = 2;
        user.locked_until = Some(Utc::now() - Duration::seconds(1));
        harness.users.update(&user).await.expect("update should work");

        login(&harness.state, &meta, EMAIL, PASSWORD)
            .await
            .expect("login should work after the lock expired");

        let user = harness
            .users
            .get(user_id)
            .await
            .expect("get should work")
            .expect("user should exist");
        assert_eq!(user.failed_attempts, 0);
        assert_eq!(user.locked_until, None);
    }

    #[tokio::test]
    async fn deactivated_account_cannot_login() {
        let harness = harness();
        let meta = RequestMeta::default();

        let user_id = register_and_verify(&harness).await;

        let mut user = harness
            .users
            .get(user_id)
            .await
            .expect("get should work")
            .expect("user should exist");
        user.active = false;
        harness.users.update(&user).await.expect("update should work");

        let result = login(&harness.state, &meta, EMAIL, PASSWORD).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn register_is_rate_limited_per_client() {
        let harness = harness_with_limiter(Arc::new(FixedWindowRateLimiter::new(RateLimits {
            register_per_minute: 1,
            login_per_minute: 10,
            verify_email_per_minute: 30,
        })));
        let meta = RequestMeta {
            ip_address: Some("1.2.3.4".to_string()),
            ..RequestMeta::default()
        };

        register(&harness.state, &meta, EMAIL, PASSWORD)
            .await
            .expect("first register should work");
        let result = register(&harness.state, &meta, "bob@example.com", PASSWORD).await;
        assert!(matches!(result, Err(AuthError::RateLimited)));

        // Another client is unaffected.
        let other = RequestMeta {
            ip_address: Some("5.6.7.8".to_string()),
            ..RequestMeta::default()
        };
        register(&harness.state, &other, "carol@example.com", PASSWORD)
            .await
            .expect("other client should register");

        assert!(harness
            .events
            .event_types()
            .contains(&SecurityEventType::RateLimitExceeded));
    }

    #[tokio::test]
    async fn login_is_rate_limited_before_credential_work() {
        let harness = harness_with_limiter(Arc::new(FixedWindowRateLimiter::new(RateLimits {
            register_per_minute: 5,
            login_per_minute: 0,
            verify_email_per_minute: 30,
        })));
        let meta = RequestMeta::default();

        let result = login(&harness.state, &meta, EMAIL, PASSWORD).await;
        assert!(matches!(result, Err(AuthError::RateLimited)));
    }

    #[test]
    fn weak_password_detail_joins_violations() {
        let err = AuthError::WeakPassword(vec![
            "Password must contain at least one digit".to_string(),
            "Password must contain at least one special character".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Password must contain at least one digit; Password must contain at least one special character"
        );
    }

    #[test]
    fn error_statuses_match_taxonomy() {
        assert_eq!(
            AuthError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::EmailNotVerified.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AccountLocked { until: Utc::now() }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::RateLimited.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AuthError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::DuplicateEmail.status(),
            StatusCode::BAD_REQUEST
        );
    }
}
