//! Authentication endpoints: register, verify-email, login.
//!
//! Handlers stay thin: extract the payload and client context, call the
//! orchestrator in `service`, translate `AuthError` into the HTTP response.

pub mod credentials;
pub mod events;
pub mod lockout;
pub mod policy;
pub mod principal;
pub mod rate_limit;
pub mod service;
pub mod state;
pub mod storage;
pub mod types;
pub mod utils;


pub use state::{AuthConfig, AuthState};

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use service::RequestMeta;
use types::{
    ErrorResponse, LoginRequest, MessageResponse, RegisterRequest, RegisterResponse,
    TokenResponse, VerifyEmailParams,
};

pub(crate) fn missing_payload() -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            detail: "Missing payload".to_string(),
        }),
    )
        .into_response()
}

/// Register a new account and send its verification email.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = RegisterResponse),
        (status = 400, description = "Weak password, invalid email, or duplicate email", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let meta = RequestMeta::from_headers(&headers, "/auth/register");
    match service::register(&state, &meta, &request.email, &request.password).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                message: "user created".to_string(),
                id,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Verify an email address by consuming the emailed token.
#[utoipa::path(
    get,
    path = "/auth/verify-email",
    params(VerifyEmailParams),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or already-consumed token", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    Query(params): Query<VerifyEmailParams>,
) -> impl IntoResponse {
    let meta = RequestMeta::from_headers(&headers, "/auth/verify-email");
    match service::verify_email(&state, &meta, &params.token).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Email verified successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Authenticate with email and password, returning a signed token pair.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Incorrect credentials or unverified email", body = ErrorResponse),
        (status = 403, description = "Account locked", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let meta = RequestMeta::from_headers(&headers, "/auth/login");
    match service::login(&state, &meta, &request.email, &request.password).await {
        Ok(pair) => (
            StatusCode::OK,
            Json(TokenResponse {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
                token_type: "bearer".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
