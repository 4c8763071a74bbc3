//! # Tenant Repository
//!
//! Write-side repository for the tenant directory: creation, status
//! transitions and credential updates. The read path used by the connection
//! pool lives in the directory module.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait,
    QueryFilter, Set,
};
use uuid::Uuid;

use crate::directory::TenantStatus;
use crate::error::RepositoryError;
use crate::models::tenant::{
    ActiveModel as TenantActiveModel, Column as TenantColumn, Entity as Tenant,
    Model as TenantModel,
};

/// Data for creating a new tenant directory entry
#[derive(Debug, Clone)]
pub struct CreateTenantRecord {
    /// Public tenant identifier (slug)
    pub tenant_id: String,
    /// Display name for the tenant
    pub name: String,
    /// Name of the tenant's dedicated database
    pub db_name: String,
    /// Connection string already encrypted by the credential cipher
    pub encrypted_connection_string: String,
}

/// Repository for Tenant database operations
pub struct TenantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantRepository<'a> {
    /// Create a new TenantRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a new tenant in `pending` status. The provisioner moves it to
    /// `active` once its database is ready.
    pub async fn create_tenant(
        &self,
        record: CreateTenantRecord,
    ) -> Result<TenantModel, RepositoryError> {
        validate_tenant_id(&record.tenant_id)?;
        validate_tenant_name(&record.name)?;

        let now = Utc::now();
        let tenant = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(record.tenant_id),
            name: Set(record.name),
            status: Set(TenantStatus::Pending.as_str().to_string()),
            db_name: Set(record.db_name),
            encrypted_connection_string: Set(record.encrypted_connection_string),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        tenant
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Get tenant by surrogate key
    pub async fn get_tenant_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<TenantModel>, RepositoryError> {
        Tenant::find_by_id(id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Get tenant by its public identifier
    pub async fn get_tenant_by_tenant_id(
        &self,
        tenant_id: &str,
    ) -> Result<Option<TenantModel>, RepositoryError> {
        Tenant::find()
            .filter(TenantColumn::TenantId.eq(tenant_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// List all tenants
    pub async fn list_tenants(&self) -> Result<Vec<TenantModel>, RepositoryError> {
        Tenant::find()
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Move a tenant to a new lifecycle status
    pub async fn set_status(
        &self,
        id: Uuid,
        status: TenantStatus,
    ) -> Result<TenantModel, RepositoryError> {
        let tenant = self
            .get_tenant_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

        let mut active = tenant.into_active_model();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Change the display name. The public tenant id is immutable: it is
    /// baked into issued tokens and the derived database name.
    pub async fn set_name(&self, id: Uuid, name: &str) -> Result<TenantModel, RepositoryError> {
        validate_tenant_name(name)?;

        let tenant = self
            .get_tenant_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

        let mut active = tenant.into_active_model();
        active.name = Set(name.to_string());
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Replace the stored encrypted connection string
    pub async fn set_encrypted_connection_string(
        &self,
        id: Uuid,
        encrypted: String,
    ) -> Result<TenantModel, RepositoryError> {
        let tenant = self
            .get_tenant_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

        let mut active = tenant.into_active_model();
        active.encrypted_connection_string = Set(encrypted);
        active.updated_at = Set(Utc::now().into());

        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Delete a tenant directory entry
    pub async fn delete_tenant(&self, id: Uuid) -> Result<(), RepositoryError> {
        let tenant = self
            .get_tenant_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

        tenant
            .delete(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }
}

/// Validate the public tenant identifier: a URL-safe slug.
fn validate_tenant_id(tenant_id: &str) -> Result<(), RepositoryError> {
    if tenant_id.len() < 2 || tenant_id.len() > 64 {
        return Err(RepositoryError::validation_error(
            "Tenant id must be between 2 and 64 characters",
        ));
    }

    if !tenant_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(RepositoryError::validation_error(
            "Tenant id can only contain lowercase letters, digits, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validate tenant display name according to business rules
fn validate_tenant_name(name: &str) -> Result<(), RepositoryError> {
    if name.trim().is_empty() {
        return Err(RepositoryError::validation_error(
            "Tenant name cannot be empty",
        ));
    }

    if name.len() > 255 {
        return Err(RepositoryError::validation_error(
            "Tenant name cannot exceed 255 characters",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '_')
    {
        return Err(RepositoryError::validation_error(
            "Tenant name can only contain letters, numbers, spaces, hyphens, and underscores",
        ));
    }

    Ok(())
}
