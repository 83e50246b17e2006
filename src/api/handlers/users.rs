//! Account self-service and administrative user management.
//!
//! `/users/me` serves the authenticated account; everything else requires a
//! superuser bearer token. Deactivation and deletion enforce the invariant
//! that the service never loses its last (active) superuser.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::credentials::hash_password;
use super::auth::events::{SecurityEvent, SecurityEventType};
use super::auth::policy::validate_password;
use super::auth::principal::{require_auth, require_superuser, Principal};
use super::auth::service::{AuthError, RequestMeta};
use super::auth::state::AuthState;
use super::auth::storage::User;
use super::auth::types::{
    AdminCreateUserRequest, ErrorResponse, ListUsersParams, MessageResponse, UserRead,
    UserUpdateRequest,
};
use super::auth::utils::valid_email;

/// Invalid ids behave like unknown ids: the caller learns nothing extra.
fn parse_user_id(id: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(id.trim()).map_err(|_| AuthError::NotFound)
}

fn user_action_event(
    state: &AuthState,
    meta: &RequestMeta,
    actor: &Principal,
    action: &str,
    target: Option<Uuid>,
) {
    let target = target.map_or_else(|| "self".to_string(), |id| id.to_string());
    state.events().emit(
        &SecurityEvent::new(SecurityEventType::UserAction, true)
            .with_user_id(actor.user_id)
            .with_ip_address(meta.ip_address.clone())
            .with_details(format!("Action: {action}, Target: {target}")),
    );
}

fn admin_event(
    state: &AuthState,
    meta: &RequestMeta,
    actor: &Principal,
    event_type: SecurityEventType,
    details: String,
) {
    state.events().emit(
        &SecurityEvent::new(event_type, true)
            .with_user_id(actor.user_id)
            .with_ip_address(meta.ip_address.clone())
            .with_user_agent(meta.user_agent.clone())
            .with_details(details),
    );
}

/// Get current user profile.
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user profile", body = UserRead),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn read_me(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match fetch_me(&state, &headers).await {
        Ok(read) => (StatusCode::OK, Json(read)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn fetch_me(state: &AuthState, headers: &HeaderMap) -> Result<UserRead, AuthError> {
    let principal = require_auth(headers, state).await?;
    let user = state
        .users()
        .get(principal.user_id)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    Ok(UserRead::from(&user))
}

/// Update current user profile.
#[utoipa::path(
    put,
    path = "/users/me",
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserRead),
        (status = 400, description = "Invalid input or duplicate email", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn update_me(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<UserUpdateRequest>>,
) -> impl IntoResponse {
    let Some(Json(update)) = payload else {
        return super::auth::missing_payload();
    };

    let meta = RequestMeta::from_headers(&headers, "/users/me");
    let result = async {
        let principal = require_auth(&headers, &state).await?;
        // Email changes on the self-service path reset verification.
        let user = apply_user_update(&state, principal.user_id, &update, true).await?;
        user_action_event(&state, &meta, &principal, "profile_update", None);
        Ok::<UserRead, AuthError>(UserRead::from(&user))
    }
    .await;

    match result {
        Ok(read) => (StatusCode::OK, Json(read)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Delete current user account.
#[utoipa::path(
    delete,
    path = "/users/me",
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 400, description = "Last superuser cannot be deleted", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn delete_me(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let meta = RequestMeta::from_headers(&headers, "/users/me");
    let result = async {
        let principal = require_auth(&headers, &state).await?;
        let user = state
            .users()
            .get(principal.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        delete_account_guarded(&state, &user).await?;

        state.events().emit(
            &SecurityEvent::new(SecurityEventType::AccountDeletion, true)
                .with_user_id(user.id)
                .with_email(user.email.clone())
                .with_ip_address(meta.ip_address.clone())
                .with_details("User deleted their own account"),
        );
        Ok::<(), AuthError>(())
    }
    .await;

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Account deleted successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// List all users (admin only).
#[utoipa::path(
    get,
    path = "/users",
    params(ListUsersParams),
    responses(
        (status = 200, description = "User list", body = [UserRead]),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Not a superuser", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Query(params): Query<ListUsersParams>,
) -> impl IntoResponse {
    let meta = RequestMeta::from_headers(&headers, "/users");
    let result = async {
        let principal = require_superuser(&headers, &state).await?;
        let users = state.users().list(params.skip, params.limit).await?;
        user_action_event(&state, &meta, &principal, "list_users", None);
        Ok::<Vec<UserRead>, AuthError>(users.iter().map(UserRead::from).collect())
    }
    .await;

    match result {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Create a new user (admin only); admin-created users are pre-verified.
#[utoipa::path(
    post,
    path = "/users",
    request_body = AdminCreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserRead),
        (status = 400, description = "Weak password, invalid email, or duplicate email", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Not a superuser", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn create_user_admin(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<AdminCreateUserRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return super::auth::missing_payload();
    };

    let meta = RequestMeta::from_headers(&headers, "/users");
    let result = async {
        let principal = require_superuser(&headers, &state).await?;
        let user = create_account(&state, &request).await?;
        admin_event(
            &state,
            &meta,
            &principal,
            SecurityEventType::AdminUserCreation,
            format!(
                "Created user {} (superuser: {})",
                user.email, user.superuser
            ),
        );
        Ok::<UserRead, AuthError>(UserRead::from(&user))
    }
    .await;

    match result {
        Ok(read) => (StatusCode::CREATED, Json(read)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Get user by ID (admin only).
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail", body = UserRead),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Not a superuser", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn get_user_admin(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let meta = RequestMeta::from_headers(&headers, "/users/{id}");
    let result = async {
        let principal = require_superuser(&headers, &state).await?;
        let user_id = parse_user_id(&id)?;
        let user = state.users().get(user_id).await?.ok_or(AuthError::NotFound)?;
        user_action_event(&state, &meta, &principal, "view_user", Some(user.id));
        Ok::<UserRead, AuthError>(UserRead::from(&user))
    }
    .await;

    match result {
        Ok(read) => (StatusCode::OK, Json(read)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Update user (admin only).
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = UserRead),
        (status = 400, description = "Invalid input or duplicate email", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Not a superuser", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn update_user_admin(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<UserUpdateRequest>>,
) -> impl IntoResponse {
    let Some(Json(update)) = payload else {
        return super::auth::missing_payload();
    };

    let meta = RequestMeta::from_headers(&headers, "/users/{id}");
    let result = async {
        let principal = require_superuser(&headers, &state).await?;
        let user_id = parse_user_id(&id)?;
        let user = apply_user_update(&state, user_id, &update, false).await?;
        admin_event(
            &state,
            &meta,
            &principal,
            SecurityEventType::AdminUserUpdate,
            format!("Updated user {}", user.email),
        );
        Ok::<UserRead, AuthError>(UserRead::from(&user))
    }
    .await;

    match result {
        Ok(read) => (StatusCode::OK, Json(read)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Activate a user account (admin only); clears lockout state.
#[utoipa::path(
    post,
    path = "/users/{id}/activate",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User activated", body = MessageResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Not a superuser", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn activate_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let meta = RequestMeta::from_headers(&headers, "/users/{id}/activate");
    let result = async {
        let principal = require_superuser(&headers, &state).await?;
        let user_id = parse_user_id(&id)?;
        let user = activate_account(&state, user_id).await?;
        admin_event(
            &state,
            &meta,
            &principal,
            SecurityEventType::AdminUserActivation,
            format!("Activated user {}", user.email),
        );
        Ok::<String, AuthError>(user.email)
    }
    .await;

    match result {
        Ok(email) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: format!("User {email} activated successfully"),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Deactivate a user account (admin only).
#[utoipa::path(
    post,
    path = "/users/{id}/deactivate",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deactivated", body = MessageResponse),
        (status = 400, description = "Last active superuser cannot be deactivated", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Not a superuser", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn deactivate_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let meta = RequestMeta::from_headers(&headers, "/users/{id}/deactivate");
    let result = async {
        let principal = require_superuser(&headers, &state).await?;
        let user_id = parse_user_id(&id)?;
        let user = deactivate_account(&state, user_id).await?;
        admin_event(
            &state,
            &meta,
            &principal,
            SecurityEventType::AdminUserDeactivation,
            format!("Deactivated user {}", user.email),
        );
        Ok::<String, AuthError>(user.email)
    }
    .await;

    match result {
        Ok(email) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: format!("User {email} deactivated successfully"),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Delete user (admin only).
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 400, description = "Last superuser cannot be deleted", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Not a superuser", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn delete_user_admin(
    Path(id): Path<String>,
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let meta = RequestMeta::from_headers(&headers, "/users/{id}");
    let result = async {
        let principal = require_superuser(&headers, &state).await?;
        let user_id = parse_user_id(&id)?;
        let user = state.users().get(user_id).await?.ok_or(AuthError::NotFound)?;

        delete_account_guarded(&state, &user).await?;

        admin_event(
            &state,
            &meta,
            &principal,
            SecurityEventType::AdminUserDeletion,
            format!("Deleted user {}", user.email),
        );
        Ok::<String, AuthError>(user.email)
    }
    .await;

    match result {
        Ok(email) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: format!("User {email} deleted successfully"),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn create_account(
    state: &AuthState,
    request: &AdminCreateUserRequest,
) -> Result<User, AuthError> {
    if !valid_email(&request.email) {
        return Err(AuthError::InvalidEmail);
    }
    let violations = validate_password(&request.password);
    if !violations.is_empty() {
        return Err(AuthError::WeakPassword(violations));
    }

    let password_hash = hash_password(&request.password).map_err(AuthError::Internal)?;
    let mut user = state.users().create(&request.email, &password_hash).await?;

    // Admin-created users skip the verification email.
    user.superuser = request.is_superuser;
    user.email_verified = true;
    state.users().update(&user).await?;

    Ok(user)
}

async fn apply_user_update(
    state: &AuthState,
    target_id: Uuid,
    update: &UserUpdateRequest,
    reset_verification: bool,
) -> Result<User, AuthError> {
    let mut user = state
        .users()
        .get(target_id)
        .await?
        .ok_or(AuthError::NotFound)?;

    if let Some(email) = update.email.as_deref() {
        if !valid_email(email) {
            return Err(AuthError::InvalidEmail);
        }
        if let Some(existing) = state.users().get_by_email(email).await? {
            if existing.id != user.id {
                return Err(AuthError::DuplicateEmail);
            }
        }
        if email != user.email {
            user.email = email.to_string();
            if reset_verification {
                user.email_verified = false;
            }
        }
    }

    if let Some(password) = update.password.as_deref() {
        let violations = validate_password(password);
        if !violations.is_empty() {
            return Err(AuthError::WeakPassword(violations));
        }
        user.password_hash = hash_password(password).map_err(AuthError::Internal)?;
    }

    state.users().update(&user).await?;
    Ok(user)
}

async fn activate_account(state: &AuthState, target_id: Uuid) -> Result<User, AuthError> {
    let mut user = state
        .users()
        .get(target_id)
        .await?
        .ok_or(AuthError::NotFound)?;

    user.active = true;
    user.failed_attempts = 0;
    user.locked_until = None;
    state.users().update(&user).await?;
    Ok(user)
}

async fn deactivate_account(state: &AuthState, target_id: Uuid) -> Result<User, AuthError> {
    let mut user = state
        .users()
        .get(target_id)
        .await?
        .ok_or(AuthError::NotFound)?;

    // Deactivating the last active superuser would lock everyone out of the
    // admin surface.
    if user.superuser && user.active && state.users().count_superusers(true).await? <= 1 {
        return Err(AuthError::InvariantViolation(
            "Cannot deactivate the last active admin",
        ));
    }

    user.active = false;
    state.users().update(&user).await?;
    Ok(user)
}

async fn delete_account_guarded(state: &AuthState, user: &User) -> Result<(), AuthError> {
    if user.superuser && state.users().count_superusers(false).await? <= 1 {
        return Err(AuthError::InvariantViolation("Cannot delete the last admin"));
    }

    if !state.users().delete(user.id).await? {
        return Err(AuthError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogEmailSender;
    use crate::api::handlers::auth::credentials::TokenSigner;
    use crate::api::handlers::auth::events::RecordingEventSink;
    use crate::api::handlers::auth::rate_limit::NoopRateLimiter;
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::api::handlers::auth::storage::{MemoryUserRepository, UserRepository};
    use chrono::{Duration, Utc};
    use secrecy::SecretString;

    fn test_state() -> (AuthState, Arc<MemoryUserRepository>) {
        let users = Arc::new(MemoryUserRepository::new());
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
            Arc::new(NoopRateLimiter),
            Arc::new(LogEmailSender),
            Arc::new(RecordingEventSink::default()),
        );
        (state, users)
    }

    async fn seed_user(users: &MemoryUserRepository, email: &str, superuser: bool) -> User {
        let mut user = users
            .create(email, "$argon2$seed")
            .await
            .expect("create should work");
        user.superuser = superuser;
        user.email_verified = true;
        users.update(&user).await.expect("update should work");
        user
    }

    #[tokio::test]
    async fn superuser_gate_rejects_regular_users() {
        let (state, users) = test_state();
        let user = seed_user(&users, "user@example.com", false).await;

        let token = state
            .tokens()
            .issue_access_token(&user.id.to_string(), None)
            .expect("issue should work");
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().expect("header should parse"),
        );

        let result = require_superuser(&headers, &state).await;
        assert!(matches!(result, Err(AuthError::Forbidden)));
    }

    #[tokio::test]
    async fn cannot_deactivate_last_active_superuser() {
        let (state, users) = test_state();
        let admin = seed_user(&users, "admin@example.com", true).await;

        let result = deactivate_account(&state, admin.id).await;
        assert!(matches!(result, Err(AuthError::InvariantViolation(_))));

        // Account set unchanged.
        let unchanged = users
            .get(admin.id)
            .await
            .expect("get should work")
            .expect("admin should exist");
        assert!(unchanged.active);
    }

    #[tokio::test]
    async fn deactivation_allowed_with_another_active_superuser() {
        let (state, users) = test_state();
        let first = seed_user(&users, "first@example.com", true).await;
        seed_user(&users, "second@example.com", true).await;

        let deactivated = deactivate_account(&state, first.id)
            .await
            .expect("deactivation should work");
        assert!(!deactivated.active);
    }

    #[tokio::test]
    async fn cannot_delete_last_superuser() {
        let (state, users) = test_state();
        let admin = seed_user(&users, "admin@example.com", true).await;

        let result = delete_account_guarded(&state, &admin).await;
        assert!(matches!(result, Err(AuthError::InvariantViolation(_))));
        assert!(users
            .get(admin.id)
            .await
            .expect("get should work")
            .is_some());
    }

    #[tokio::test]
    async fn inactive_superuser_still_counts_for_deletion_guard() {
        let (state, users) = test_state();
        let admin = seed_user(&users, "admin@example.com", true).await;
        let mut retired = seed_user(&users, "retired@example.com", true).await;
        retired.active = false;
        users.update(&retired).await.expect("update should work");

        // Two superusers exist, so deleting one is fine.
        delete_account_guarded(&state, &admin)
            .await
            .expect("deletion should work");

        // The retired one is now the last superuser.
        let result = delete_account_guarded(&state, &retired).await;
        assert!(matches!(result, Err(AuthError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn activate_clears_lockout_state() {
        let (state, users) = test_state();
        let mut user = seed_user(&users, "locked@example.com", false).await;
        user.active = false;
        user.failed_attempts = 4;
        user.locked_until = Some(Utc::now() + Duration::minutes(10));
        users.update(&user).await.expect("update should work");

        let activated = activate_account(&state, user.id)
            .await
            .expect("activation should work");
        assert!(activated.active);
        assert_eq!(activated.failed_attempts, 0);
        assert_eq!(activated.locked_until, None);
    }

    #[tokio::test]
    async fn self_email_update_resets_verification() {
        let (state, users) = test_state();
        let user = seed_user(&users, "old@example.com", false).await;

        let update = UserUpdateRequest {
            email: Some("new@example.com".to_string()),
            password: None,
        };
        let updated = apply_user_update(&state, user.id, &update, true)
            .await
            .expect("update should work");
        assert_eq!(updated.email, "new@example.com");
        assert!(!updated.email_verified);
    }

    #[tokio::test]
    async fn admin_email_update_keeps_verification() {
        let (state, users) = test_state();
        let user = seed_user(&users, "old@example.com", false).await;

        let update = UserUpdateRequest {
            email: Some("new@example.com".to_string()),
            password: None,
        };
        let updated = apply_user_update(&state, user.id, &update, false)
            .await
            .expect("update should work");
        assert!(updated.email_verified);
    }

    #[tokio::test]
    async fn update_rejects_taken_email() {
        let (state, users) = test_state();
        seed_user(&users, "taken@example.com", false).await;
        let user = seed_user(&users, "mine@example.com", false).await;

        let update = UserUpdateRequest {
            email: Some("taken@example.com".to_string()),
            password: None,
        };
        let result = apply_user_update(&state, user.id, &update, true).await;
        assert!(matches!(result, Err(AuthError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn update_rejects_weak_password() {
        let (state, users) = test_state();
        let user = seed_user(&users, "user@example.com", false).await;

        let update = UserUpdateRequest {
            email: None,
            password: Some("weak".to_string()),
        };
        let result = apply_user_update(&state, user.id, &update, true).await;
        assert!(matches!(result, Err(AuthError::WeakPassword(_))));
    }

    #[tokio::test]
    async fn admin_created_users_are_pre_verified() {
        let (state, _users) = test_state();

        let request = AdminCreateUserRequest {
            email: "new@example.com".to_string(),
            password: "ValidPass123!".to_string(),
            is_superuser: true,
        };
        let user = create_account(&state, &request)
            .await
            .expect("create should work");
        assert!(user.email_verified);
        assert!(user.superuser);
    }
}
