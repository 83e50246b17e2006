//! Authenticated principal extraction and authorization helpers.
//!
//! Resolve the `Authorization: Bearer <access token>` header to a live
//! account. Token decode failures, unknown subjects, and deactivated accounts
//! all collapse into the same 401 so the header reveals nothing about which
//! accounts exist.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use uuid::Uuid;

use super::service::AuthError;
use super::state::AuthState;

/// Authenticated user context derived from the bearer token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub superuser: bool,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the bearer token into a principal.
///
/// # Errors
/// `Unauthorized` for missing/invalid/expired tokens or inactive accounts.
pub async fn require_auth(headers: &HeaderMap, state: &AuthState) -> Result<Principal, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::Unauthorized)?;

    let claims = state
        .tokens()
        .decode(token)
        .map_err(|_| AuthError::Unauthorized)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthorized)?;

    let user = state
        .users()
        .get(user_id)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    if !user.active {
        return Err(AuthError::Unauthorized);
    }

    Ok(Principal {
        user_id: user.id,
        email: user.email,
        superuser: user.superuser,
    })
}

/// Resolve the bearer token and require the superuser role.
///
/// # Errors
/// `Unauthorized` as in [`require_auth`], `Forbidden` for non-superusers.
pub async fn require_superuser(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<Principal, AuthError> {
    let principal = require_auth(headers, state).await?;
    if !principal.superuser {
        return Err(AuthError::Forbidden);
    }
    Ok(principal)
}
