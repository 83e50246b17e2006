//! OpenAPI document for the service, served through Swagger UI at `/docs`.

use utoipa::OpenApi;

use crate::api::handlers::auth::types::{
    AdminCreateUserRequest, ErrorResponse, LoginRequest, MessageResponse, RegisterRequest,
    RegisterResponse, TokenResponse, UserRead, UserUpdateRequest,
};
use crate::api::handlers::health::Health;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health,
        crate::api::handlers::auth::register,
        crate::api::handlers::auth::verify_email,
        crate::api::handlers::auth::login,
        crate::api::handlers::users::read_me,
        crate::api::handlers::users::update_me,
        crate::api::handlers::users::delete_me,
        crate::api::handlers::users::list_users,
        crate::api::handlers::users::create_user_admin,
        crate::api::handlers::users::get_user_admin,
        crate::api::handlers::users::update_user_admin,
        crate::api::handlers::users::activate_user,
        crate::api::handlers::users::deactivate_user,
        crate::api::handlers::users::delete_user_admin,
    ),
    components(schemas(
        Health,
        RegisterRequest,
        LoginRequest,
        RegisterResponse,
        TokenResponse,
        MessageResponse,
        ErrorResponse,
        UserRead,
        UserUpdateRequest,
        AdminCreateUserRequest,
    )),
    tags(
        (name = "auth", description = "Registration, email verification, and login"),
        (name = "users", description = "Self-service and administrative user management"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;
