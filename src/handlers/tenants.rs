//! # Tenants API Handlers
//!
//! Handlers for tenant provisioning, lifecycle and membership management.
//! Provisioning and lifecycle are gated on the global `admin` role;
//! membership management is gated on the tenant-scoped `admin` role (or a
//! global admin acting across tenants).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentIdentity;
use crate::authz::{
    AccessError, forbid_self_target, require_global_role, require_tenant_role, resolve_tenant,
};
use crate::error::{ApiError, RepositoryError};
use crate::models::tenant::Model as TenantModel;
use crate::provisioner::TenantProvisioner;
use crate::repositories::{TenantRepository, TenantUserRepository, UserRepository};
use crate::server::AppState;
use crate::token::Identity;

pub const GLOBAL_ADMIN_ROLE: &str = "admin";
pub const TENANT_ADMIN_ROLE: &str = "admin";

/// Request payload for creating a new tenant
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTenantRequestDto {
    /// Public tenant identifier (slug)
    #[schema(example = "acme")]
    pub tenant_id: String,
    /// Display name for the tenant
    #[schema(example = "Acme Corp")]
    pub name: String,
    /// Connection string for the tenant's database; stored encrypted
    pub connection_string: String,
}

/// Tenant representation in responses. Credentials never appear here.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantResponseDto {
    /// Public tenant identifier
    #[schema(example = "acme")]
    pub tenant_id: String,
    /// Display name
    #[schema(example = "Acme Corp")]
    pub name: String,
    /// Lifecycle status
    #[schema(example = "active")]
    pub status: String,
    /// Timestamp when the tenant was created (ISO 8601)
    pub created_at: String,
}

impl From<TenantModel> for TenantResponseDto {
    fn from(model: TenantModel) -> Self {
        Self {
            tenant_id: model.tenant_id,
            name: model.name,
            status: model.status,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// One tenant the caller belongs to, with their roles in it
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MyTenantDto {
    /// Public tenant identifier
    pub tenant_id: String,
    /// Display name
    pub name: String,
    /// Lifecycle status
    pub status: String,
    /// The caller's roles within this tenant
    pub roles: Vec<String>,
}

/// Request payload for updating a tenant. Absent fields are left alone;
/// the public tenant id cannot be changed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateTenantRequestDto {
    /// New display name
    #[schema(example = "Acme Corporation")]
    pub name: Option<String>,
    /// Replacement connection string; stored encrypted
    pub connection_string: Option<String>,
}

/// Request payload for adding a member to a tenant
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddMemberRequestDto {
    /// Email of the user to add
    #[schema(example = "user@example.com")]
    pub email: String,
    /// Tenant-scoped roles to grant
    #[schema(example = json!(["member"]))]
    pub roles: Vec<String>,
}

/// Request payload for replacing a member's roles
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateMemberRolesRequestDto {
    /// The new role set
    #[schema(example = json!(["member", "admin"]))]
    pub roles: Vec<String>,
}

/// One tenant member
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemberDto {
    /// The member's user id
    pub user_id: Uuid,
    /// Roles within the tenant
    pub roles: Vec<String>,
    /// Binding status
    pub status: String,
}

/// Tenant admin within the tenant, or a global admin.
fn require_tenant_admin(identity: &Identity, tenant_id: &str) -> Result<(), ApiError> {
    if identity.has_global_role(GLOBAL_ADMIN_ROLE) {
        return Ok(());
    }
    let effective = resolve_tenant(identity, tenant_id)?;
    require_tenant_role(&effective, TENANT_ADMIN_ROLE)?;
    Ok(())
}

/// Provision a new tenant
#[utoipa::path(
    post,
    path = "/api/v1/tenants",
    security(("bearer_auth" = [])),
    request_body = CreateTenantRequestDto,
    responses(
        (status = 201, description = "Tenant created", body = TenantResponseDto),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "Global admin role required", body = ApiError),
        (status = 409, description = "Tenant already exists", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(request): Json<CreateTenantRequestDto>,
) -> Result<(StatusCode, Json<TenantResponseDto>), ApiError> {
    require_global_role(&identity, GLOBAL_ADMIN_ROLE)?;

    let provisioner = TenantProvisioner::new(state.db.clone(), state.cipher.clone());
    let tenant = provisioner
        .create_tenant(&request.tenant_id, &request.name, &request.connection_string)
        .await?;

    Ok((StatusCode::CREATED, Json(tenant.into())))
}

/// List the tenants the caller belongs to
#[utoipa::path(
    get,
    path = "/api/v1/tenants/mine",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The caller's tenants", body = [MyTenantDto]),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn list_my_tenants(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<Vec<MyTenantDto>>, ApiError> {
    // Read from the directory, not the token: the listing reflects the
    // bindings as they are now, not as they were at login.
    let bindings = TenantUserRepository::new(&state.db)
        .bindings_for_user(identity.user_id)
        .await?;

    let tenants = bindings
        .into_iter()
        .map(|(binding, tenant)| MyTenantDto {
            tenant_id: tenant.tenant_id,
            name: tenant.name,
            status: tenant.status,
            roles: TenantUserRepository::roles(&binding),
        })
        .collect();

    Ok(Json(tenants))
}

/// Get one tenant
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenant_id}",
    security(("bearer_auth" = [])),
    params(
        ("tenant_id" = String, Path, description = "Public tenant identifier")
    ),
    responses(
        (status = 200, description = "Tenant", body = TenantResponseDto),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "No access to the tenant", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantResponseDto>, ApiError> {
    // Membership is decided before the directory is consulted, so an
    // outsider cannot distinguish "no access" from "does not exist".
    if !identity.has_global_role(GLOBAL_ADMIN_ROLE) && identity.tenant_grant(&tenant_id).is_none()
    {
        return Err(AccessError::TenantAccessDenied.into());
    }

    let tenant = TenantRepository::new(&state.db)
        .get_tenant_by_tenant_id(&tenant_id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

    Ok(Json(tenant.into()))
}

/// Update a tenant's name or stored connection string
#[utoipa::path(
    put,
    path = "/api/v1/tenants/{tenant_id}",
    security(("bearer_auth" = [])),
    params(
        ("tenant_id" = String, Path, description = "Public tenant identifier")
    ),
    request_body = UpdateTenantRequestDto,
    responses(
        (status = 200, description = "Tenant updated", body = TenantResponseDto),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 403, description = "Global admin role required", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn update_tenant(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(tenant_id): Path<String>,
    Json(request): Json<UpdateTenantRequestDto>,
) -> Result<Json<TenantResponseDto>, ApiError> {
    require_global_role(&identity, GLOBAL_ADMIN_ROLE)?;

    let provisioner = TenantProvisioner::new(state.db.clone(), state.cipher.clone());
    let tenant = provisioner
        .update_tenant(
            &tenant_id,
            request.name.as_deref(),
            request.connection_string.as_deref(),
        )
        .await?;

    Ok(Json(tenant.into()))
}

/// Suspend a tenant
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/suspend",
    security(("bearer_auth" = [])),
    params(
        ("tenant_id" = String, Path, description = "Public tenant identifier")
    ),
    responses(
        (status = 200, description = "Tenant suspended", body = TenantResponseDto),
        (status = 403, description = "Global admin role required", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError),
        (status = 409, description = "Tenant is not active", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn suspend_tenant(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantResponseDto>, ApiError> {
    require_global_role(&identity, GLOBAL_ADMIN_ROLE)?;

    let provisioner = TenantProvisioner::new(state.db.clone(), state.cipher.clone());
    let tenant = provisioner.suspend_tenant(&tenant_id).await?;

    Ok(Json(tenant.into()))
}

/// Resume a suspended tenant
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/resume",
    security(("bearer_auth" = [])),
    params(
        ("tenant_id" = String, Path, description = "Public tenant identifier")
    ),
    responses(
        (status = 200, description = "Tenant resumed", body = TenantResponseDto),
        (status = 403, description = "Global admin role required", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError),
        (status = 409, description = "Tenant is not suspended", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn resume_tenant(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(tenant_id): Path<String>,
) -> Result<Json<TenantResponseDto>, ApiError> {
    require_global_role(&identity, GLOBAL_ADMIN_ROLE)?;

    let provisioner = TenantProvisioner::new(state.db.clone(), state.cipher.clone());
    let tenant = provisioner.resume_tenant(&tenant_id).await?;

    Ok(Json(tenant.into()))
}

/// Delete a tenant
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{tenant_id}",
    security(("bearer_auth" = [])),
    params(
        ("tenant_id" = String, Path, description = "Public tenant identifier")
    ),
    responses(
        (status = 204, description = "Tenant deleted"),
        (status = 403, description = "Global admin role required", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn delete_tenant(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(tenant_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_global_role(&identity, GLOBAL_ADMIN_ROLE)?;

    let provisioner = TenantProvisioner::new(state.db.clone(), state.cipher.clone());
    provisioner.delete_tenant(&tenant_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// List tenant members
#[utoipa::path(
    get,
    path = "/api/v1/tenants/{tenant_id}/users",
    security(("bearer_auth" = [])),
    params(
        ("tenant_id" = String, Path, description = "Public tenant identifier")
    ),
    responses(
        (status = 200, description = "Tenant members", body = [MemberDto]),
        (status = 403, description = "Tenant admin role required", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "members"
)]
pub async fn list_members(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(tenant_id): Path<String>,
) -> Result<Json<Vec<MemberDto>>, ApiError> {
    require_tenant_admin(&identity, &tenant_id)?;

    let tenant = TenantRepository::new(&state.db)
        .get_tenant_by_tenant_id(&tenant_id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

    let members = TenantUserRepository::new(&state.db)
        .list_members(tenant.id)
        .await?
        .into_iter()
        .map(|binding| MemberDto {
            user_id: binding.user_id,
            roles: TenantUserRepository::roles(&binding),
            status: binding.status,
        })
        .collect();

    Ok(Json(members))
}

/// Add a member to a tenant
#[utoipa::path(
    post,
    path = "/api/v1/tenants/{tenant_id}/users",
    security(("bearer_auth" = [])),
    params(
        ("tenant_id" = String, Path, description = "Public tenant identifier")
    ),
    request_body = AddMemberRequestDto,
    responses(
        (status = 201, description = "Member added", body = MemberDto),
        (status = 403, description = "Tenant admin role required", body = ApiError),
        (status = 404, description = "Tenant or user not found", body = ApiError),
        (status = 409, description = "User is already a member", body = ApiError)
    ),
    tag = "members"
)]
pub async fn add_member(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(tenant_id): Path<String>,
    Json(request): Json<AddMemberRequestDto>,
) -> Result<(StatusCode, Json<MemberDto>), ApiError> {
    require_tenant_admin(&identity, &tenant_id)?;

    let tenant = TenantRepository::new(&state.db)
        .get_tenant_by_tenant_id(&tenant_id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

    let user = UserRepository::new(&state.db)
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))?;

    let binding = TenantUserRepository::new(&state.db)
        .add_binding(user.id, tenant.id, request.roles)
        .await?;

    tracing::info!(tenant_id = %tenant_id, user_id = %user.id, "Member added to tenant");

    Ok((
        StatusCode::CREATED,
        Json(MemberDto {
            user_id: binding.user_id,
            roles: TenantUserRepository::roles(&binding),
            status: binding.status,
        }),
    ))
}

/// Replace a member's roles
#[utoipa::path(
    put,
    path = "/api/v1/tenants/{tenant_id}/users/{user_id}",
    security(("bearer_auth" = [])),
    params(
        ("tenant_id" = String, Path, description = "Public tenant identifier"),
        ("user_id" = Uuid, Path, description = "Member user id")
    ),
    request_body = UpdateMemberRolesRequestDto,
    responses(
        (status = 200, description = "Roles updated", body = MemberDto),
        (status = 403, description = "Tenant admin role required, or self-demotion refused", body = ApiError),
        (status = 404, description = "Tenant or binding not found", body = ApiError)
    ),
    tag = "members"
)]
pub async fn update_member_roles(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path((tenant_id, user_id)): Path<(String, Uuid)>,
    Json(request): Json<UpdateMemberRolesRequestDto>,
) -> Result<Json<MemberDto>, ApiError> {
    require_tenant_admin(&identity, &tenant_id)?;

    // An admin may not strip their own admin role; another admin has to.
    if user_id == identity.user_id
        && !request.roles.iter().any(|r| r == TENANT_ADMIN_ROLE)
    {
        return Err(AccessError::Denied.into());
    }

    let tenant = TenantRepository::new(&state.db)
        .get_tenant_by_tenant_id(&tenant_id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

    let binding = TenantUserRepository::new(&state.db)
        .update_roles(user_id, tenant.id, request.roles)
        .await?;

    Ok(Json(MemberDto {
        user_id: binding.user_id,
        roles: TenantUserRepository::roles(&binding),
        status: binding.status,
    }))
}

/// Remove a member from a tenant
#[utoipa::path(
    delete,
    path = "/api/v1/tenants/{tenant_id}/users/{user_id}",
    security(("bearer_auth" = [])),
    params(
        ("tenant_id" = String, Path, description = "Public tenant identifier"),
        ("user_id" = Uuid, Path, description = "Member user id")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Tenant admin role required, or self-removal refused", body = ApiError),
        (status = 404, description = "Tenant or binding not found", body = ApiError)
    ),
    tag = "members"
)]
pub async fn remove_member(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path((tenant_id, user_id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError> {
    require_tenant_admin(&identity, &tenant_id)?;
    forbid_self_target(&identity, user_id)?;

    let tenant = TenantRepository::new(&state.db)
        .get_tenant_by_tenant_id(&tenant_id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

    TenantUserRepository::new(&state.db)
        .remove_binding(user_id, tenant.id)
        .await?;

    tracing::info!(tenant_id = %tenant_id, user_id = %user_id, "Member removed from tenant");

    Ok(StatusCode::NO_CONTENT)
}
