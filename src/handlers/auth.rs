//! # Authentication Handlers
//!
//! Self-registration and login. Login exchanges credentials for a signed
//! access token carrying the user's global roles and tenant grants;
//! registration creates an account with no roles at all, so a fresh user
//! can do nothing until an admin binds them to a tenant.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, unauthorized, validation_error};
use crate::repositories::{TenantUserRepository, UserRepository, user::verify_password};
use crate::server::AppState;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Login request payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequestDto {
    /// Login email
    #[schema(example = "admin@example.com")]
    pub email: String,
    /// Password
    pub password: String,
}

/// Login response payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponseDto {
    /// Signed bearer token
    pub token: String,
}

/// Registration request payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequestDto {
    /// Login email
    #[schema(example = "user@example.com")]
    pub email: String,
    /// Password, at least 8 characters
    pub password: String,
}

/// Registration response payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponseDto {
    /// The new user's id
    pub user_id: Uuid,
    /// Normalized login email
    pub email: String,
}

/// Create an account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequestDto,
    responses(
        (status = 201, description = "Account created", body = RegisterResponseDto),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequestDto>,
) -> Result<(StatusCode, Json<RegisterResponseDto>), ApiError> {
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return Err(validation_error(
            "Password too short",
            serde_json::json!({ "password": "must be at least 8 characters" }),
        ));
    }

    // No roles and no grants: the account exists but reaches nothing until
    // an admin binds it to a tenant.
    let user = UserRepository::new(&state.db)
        .create_user(&request.email, &request.password, vec![])
        .await?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponseDto {
            user_id: user.id,
            email: user.email,
        }),
    ))
}

/// Exchange credentials for an access token
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequestDto,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponseDto),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequestDto>,
) -> Result<Json<LoginResponseDto>, ApiError> {
    let users = UserRepository::new(&state.db);

    // Unknown email and wrong password produce the same response; the
    // caller learns nothing about which accounts exist.
    let user = users
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(|| unauthorized(Some("Invalid credentials")))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(unauthorized(Some("Invalid credentials")));
    }

    let grants = TenantUserRepository::new(&state.db)
        .grants_for_user(user.id)
        .await?;
    let global_roles = UserRepository::global_roles(&user);

    let token = state
        .token_keys
        .issue(user.id, global_roles, grants)
        .map_err(|e| {
            tracing::error!(error = %e, "Token signing failed");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to issue token",
            )
        })?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(LoginResponseDto { token }))
}
