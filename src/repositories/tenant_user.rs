//! # Tenant-User Binding Repository
//!
//! Repository for memberships of users in tenants. The (user, tenant) pair
//! is unique at the database level; the role set on the binding is what the
//! authorization layer sees inside issued tokens.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait,
    QueryFilter, Set,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::tenant_user::{
    ActiveModel as TenantUserActiveModel, Column as TenantUserColumn, Entity as TenantUser,
    Model as TenantUserModel,
};
use crate::models::{Tenant, tenant::Model as TenantModel};
use crate::repositories::{roles_from_json, roles_to_json};
use crate::token::TenantGrant;

const BINDING_STATUS_ACTIVE: &str = "active";
const BINDING_STATUS_REVOKED: &str = "revoked";

/// Repository for tenant-user binding operations
pub struct TenantUserRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantUserRepository<'a> {
    /// Create a new TenantUserRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Bind a user to a tenant with the given roles. Fails with a conflict
    /// if the binding already exists.
    pub async fn add_binding(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        roles: Vec<String>,
    ) -> Result<TenantUserModel, RepositoryError> {
        validate_roles(&roles)?;

        let now = Utc::now();
        let binding = TenantUserActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            tenant_id: Set(tenant_id),
            roles: Set(roles_to_json(&roles)),
            status: Set(BINDING_STATUS_ACTIVE.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        binding
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Find the binding between a user and a tenant
    pub async fn find_binding(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<TenantUserModel>, RepositoryError> {
        TenantUser::find()
            .filter(TenantUserColumn::UserId.eq(user_id))
            .filter(TenantUserColumn::TenantId.eq(tenant_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Replace the role set on an existing binding
    pub async fn update_roles(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        roles: Vec<String>,
    ) -> Result<TenantUserModel, RepositoryError> {
        validate_roles(&roles)?;

        let binding = self
            .find_binding(user_id, tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Binding not found".to_string()))?;

        let mut active = binding.into_active_model();
        active.roles = Set(roles_to_json(&roles));
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Remove the binding between a user and a tenant
    pub async fn remove_binding(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<(), RepositoryError> {
        let binding = self
            .find_binding(user_id, tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Binding not found".to_string()))?;

        binding
            .delete(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    /// Mark a binding revoked without deleting the row. A revoked binding
    /// no longer grants anything and is excluded from membership listings,
    /// but the row stays behind for auditing.
    pub async fn revoke_binding(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<TenantUserModel, RepositoryError> {
        let binding = self
            .find_binding(user_id, tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Binding not found".to_string()))?;

        let mut active = binding.into_active_model();
        active.status = Set(BINDING_STATUS_REVOKED.to_string());
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Active bindings for one tenant, for membership listings
    pub async fn list_members(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<TenantUserModel>, RepositoryError> {
        TenantUser::find()
            .filter(TenantUserColumn::TenantId.eq(tenant_id))
            .filter(TenantUserColumn::Status.eq(BINDING_STATUS_ACTIVE))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Active bindings for one user together with the tenant rows they
    /// point at, for token issuance and the "my tenants" listing. Pending
    /// and revoked bindings grant nothing and are not returned.
    pub async fn bindings_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(TenantUserModel, TenantModel)>, RepositoryError> {
        let rows = TenantUser::find()
            .filter(TenantUserColumn::UserId.eq(user_id))
            .filter(TenantUserColumn::Status.eq(BINDING_STATUS_ACTIVE))
            .find_also_related(Tenant)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        // A binding without a tenant row is an orphan; skip it rather than
        // issuing a grant to a tenant that no longer exists.
        Ok(rows
            .into_iter()
            .filter_map(|(binding, tenant)| tenant.map(|t| (binding, t)))
            .collect())
    }

    /// The user's grants in token form: public tenant id plus roles.
    pub async fn grants_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TenantGrant>, RepositoryError> {
        let bindings = self.bindings_for_user(user_id).await?;

        Ok(bindings
            .into_iter()
            .map(|(binding, tenant)| TenantGrant {
                tenant_id: tenant.tenant_id,
                roles: roles_from_json(&binding.roles),
            })
            .collect())
    }

    /// The role set on a binding
    pub fn roles(binding: &TenantUserModel) -> Vec<String> {
        roles_from_json(&binding.roles)
    }
}

fn validate_roles(roles: &[String]) -> Result<(), RepositoryError> {
    if roles.is_empty() {
        return Err(RepositoryError::validation_error(
            "At least one role is required",
        ));
    }

    for role in roles {
        if role.trim().is_empty() || role.len() > 64 {
            return Err(RepositoryError::validation_error(
                "Roles must be non-empty and at most 64 characters",
            ));
        }
    }

    Ok(())
}
