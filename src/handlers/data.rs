//! # Tenant Data Handlers
//!
//! The tenant-scoped data endpoint. Demonstrates the full request path:
//! verified identity, tenant resolution, then a live handle from the tenant
//! connection pool. Authorization is settled before the pool is touched, so
//! a denied caller never triggers a tenant database connection.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Json,
};
use sea_orm::{ConnectionTrait, Statement};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::CurrentIdentity;
use crate::authz::resolve_tenant;
use crate::error::{ApiError, validation_error};
use crate::server::AppState;

/// Response payload for the tenant data endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TenantDataResponseDto {
    /// The tenant the data was served from
    #[schema(example = "acme")]
    pub tenant_id: String,
    /// Tenant database status
    #[schema(example = "ok")]
    pub database: String,
}

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Option<String>,
}

/// Read the requested tenant id from the `X-Tenant-Id` header, falling back
/// to the `tenant_id` query parameter.
fn requested_tenant_id(headers: &HeaderMap, query: &TenantQuery) -> Result<String, ApiError> {
    if let Some(value) = headers.get("X-Tenant-Id") {
        return value.to_str().map(|s| s.to_string()).map_err(|_| {
            validation_error(
                "Invalid tenant header",
                serde_json::json!({ "X-Tenant-Id": "Header must be valid UTF-8" }),
            )
        });
    }

    query.tenant_id.clone().ok_or_else(|| {
        validation_error(
            "Missing tenant id",
            serde_json::json!({
                "X-Tenant-Id": "Provide the tenant id via this header or the tenant_id query parameter"
            }),
        )
    })
}

/// Access tenant-scoped data
#[utoipa::path(
    get,
    path = "/api/v1/data",
    security(("bearer_auth" = [])),
    params(
        ("X-Tenant-Id" = Option<String>, Header, description = "Tenant the request is scoped to"),
        ("tenant_id" = Option<String>, Query, description = "Tenant id, when the header is not set")
    ),
    responses(
        (status = 200, description = "Tenant data", body = TenantDataResponseDto),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 403, description = "No access to the tenant", body = ApiError),
        (status = 404, description = "Tenant unavailable", body = ApiError),
        (status = 503, description = "Tenant database unreachable", body = ApiError)
    ),
    tag = "data"
)]
pub async fn get_tenant_data(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    headers: HeaderMap,
    Query(query): Query<TenantQuery>,
) -> Result<Json<TenantDataResponseDto>, ApiError> {
    let tenant_id = requested_tenant_id(&headers, &query)?;

    // Membership is checked against the token alone; an unbound caller is
    // refused without revealing whether the tenant exists.
    let effective = resolve_tenant(&identity, &tenant_id)?;

    let conn = state.pool.acquire(&effective.tenant_id).await?;

    let stmt = Statement::from_string(conn.get_database_backend(), "SELECT 1".to_string());
    conn.query_one(stmt).await.map_err(ApiError::from)?;

    Ok(Json(TenantDataResponseDto {
        tenant_id: effective.tenant_id,
        database: "ok".to_string(),
    }))
}
