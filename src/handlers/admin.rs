//! # Admin API Handlers
//!
//! User administration: account creation and global role management. All
//! operations require the global `superadmin` role, and a superadmin cannot
//! revoke their own roles.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentIdentity;
use crate::authz::{forbid_self_target, require_global_role};
use crate::error::{ApiError, RepositoryError};
use crate::models::user::Model as UserModel;
use crate::repositories::UserRepository;
use crate::server::AppState;

pub const SUPERADMIN_ROLE: &str = "superadmin";

/// Request payload for creating a user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequestDto {
    /// Login email
    #[schema(example = "user@example.com")]
    pub email: String,
    /// Initial password
    pub password: String,
    /// Initial global roles
    #[serde(default)]
    pub global_roles: Vec<String>,
}

/// Request payload for granting a global role
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GrantRoleRequestDto {
    /// The role to grant
    #[schema(example = "admin")]
    pub role: String,
}

/// User representation in admin responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponseDto {
    /// User id
    pub id: Uuid,
    /// Login email
    pub email: String,
    /// Global roles
    pub global_roles: Vec<String>,
}

impl From<UserModel> for UserResponseDto {
    fn from(model: UserModel) -> Self {
        let global_roles = UserRepository::global_roles(&model);
        Self {
            id: model.id,
            email: model.email,
            global_roles,
        }
    }
}

/// List all users
#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All users", body = [UserResponseDto]),
        (status = 403, description = "Superadmin role required", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<Vec<UserResponseDto>>, ApiError> {
    require_global_role(&identity, SUPERADMIN_ROLE)?;

    let users = UserRepository::new(&state.db)
        .list_users()
        .await?
        .into_iter()
        .map(UserResponseDto::from)
        .collect();

    Ok(Json(users))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/api/v1/admin/users",
    security(("bearer_auth" = [])),
    request_body = CreateUserRequestDto,
    responses(
        (status = 201, description = "User created", body = UserResponseDto),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 403, description = "Superadmin role required", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn create_user(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(request): Json<CreateUserRequestDto>,
) -> Result<(StatusCode, Json<UserResponseDto>), ApiError> {
    require_global_role(&identity, SUPERADMIN_ROLE)?;

    let user = UserRepository::new(&state.db)
        .create_user(&request.email, &request.password, request.global_roles)
        .await?;

    tracing::info!(user_id = %user.id, "User created");

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Grant a global role to a user
#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{user_id}/roles",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = Uuid, Path, description = "Target user id")
    ),
    request_body = GrantRoleRequestDto,
    responses(
        (status = 200, description = "Role granted", body = UserResponseDto),
        (status = 403, description = "Superadmin role required", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn grant_global_role(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(user_id): Path<Uuid>,
    Json(request): Json<GrantRoleRequestDto>,
) -> Result<Json<UserResponseDto>, ApiError> {
    require_global_role(&identity, SUPERADMIN_ROLE)?;

    let repo = UserRepository::new(&state.db);
    let user = repo
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))?;

    let mut roles = UserRepository::global_roles(&user);
    if !roles.contains(&request.role) {
        roles.push(request.role);
    }

    let user = repo.set_global_roles(user_id, roles).await?;
    Ok(Json(user.into()))
}

/// Revoke a global role from a user
#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{user_id}/roles/{role}",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = Uuid, Path, description = "Target user id"),
        ("role" = String, Path, description = "Role to revoke")
    ),
    responses(
        (status = 200, description = "Role revoked", body = UserResponseDto),
        (status = 403, description = "Superadmin role required, or self-revocation refused", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn revoke_global_role(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path((user_id, role)): Path<(Uuid, String)>,
) -> Result<Json<UserResponseDto>, ApiError> {
    require_global_role(&identity, SUPERADMIN_ROLE)?;
    // A superadmin cannot strip their own privileges; another superadmin
    // has to do it.
    forbid_self_target(&identity, user_id)?;

    let repo = UserRepository::new(&state.db);
    let user = repo
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))?;

    let roles: Vec<String> = UserRepository::global_roles(&user)
        .into_iter()
        .filter(|r| r != &role)
        .collect();

    let user = repo.set_global_roles(user_id, roles).await?;
    Ok(Json(user.into()))
}
