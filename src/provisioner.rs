//! # Tenant provisioning
//!
//! Lifecycle transitions for tenants: create a directory entry in `pending`
//! status, prepare the dedicated database, then activate; suspend and
//! resume; delete with the database dropped before the directory entry so a
//! failed drop never leaves an orphaned database behind.

use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use thiserror::Error;
use tracing::{info, warn};

use crate::crypto::{CredentialCipher, CryptoError};
use crate::directory::TenantStatus;
use crate::error::RepositoryError;
use crate::models::tenant::Model as TenantModel;
use crate::repositories::{CreateTenantRecord, TenantRepository};

#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("database statement failed: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("tenant {tenant_id} cannot move from {from} to {to}")]
    InvalidTransition {
        tenant_id: String,
        from: &'static str,
        to: &'static str,
    },
}

/// Provisions tenants against the master database.
pub struct TenantProvisioner {
    db: DatabaseConnection,
    cipher: Arc<CredentialCipher>,
}

impl TenantProvisioner {
    pub fn new(db: DatabaseConnection, cipher: Arc<CredentialCipher>) -> Self {
        Self { db, cipher }
    }

    /// Create a tenant: insert the directory entry in `pending` status with
    /// the connection string encrypted, prepare the dedicated database,
    /// then activate. The plaintext connection string never touches the
    /// directory.
    pub async fn create_tenant(
        &self,
        tenant_id: &str,
        name: &str,
        connection_string: &str,
    ) -> Result<TenantModel, ProvisionerError> {
        let db_name = db_name_for(tenant_id);
        let encrypted = self.cipher.encrypt(connection_string)?;

        let repo = TenantRepository::new(&self.db);
        let tenant = repo
            .create_tenant(CreateTenantRecord {
                tenant_id: tenant_id.to_string(),
                name: name.to_string(),
                db_name: db_name.clone(),
                encrypted_connection_string: encrypted,
            })
            .await?;

        self.create_database(&db_name).await?;

        let tenant = repo.set_status(tenant.id, TenantStatus::Active).await?;
        info!(tenant_id, db_name = %db_name, "Tenant provisioned and activated");

        Ok(tenant)
    }

    /// Update tenant metadata: the display name, the stored connection
    /// string, or both. A new connection string is encrypted before it is
    /// written; cached pool connections keep using the old credentials
    /// until the idle sweep reclaims them.
    pub async fn update_tenant(
        &self,
        tenant_id: &str,
        name: Option<&str>,
        connection_string: Option<&str>,
    ) -> Result<TenantModel, ProvisionerError> {
        let repo = TenantRepository::new(&self.db);
        let mut tenant = repo
            .get_tenant_by_tenant_id(tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

        if let Some(name) = name {
            tenant = repo.set_name(tenant.id, name).await?;
        }

        if let Some(connection_string) = connection_string {
            let encrypted = self.cipher.encrypt(connection_string)?;
            tenant = repo
                .set_encrypted_connection_string(tenant.id, encrypted)
                .await?;
            info!(tenant_id, "Tenant connection string rotated");
        }

        Ok(tenant)
    }

    /// Suspend an active tenant. Cached pool connections are reclaimed by
    /// the next idle sweep; new acquisitions are refused immediately.
    pub async fn suspend_tenant(&self, tenant_id: &str) -> Result<TenantModel, ProvisionerError> {
        self.transition(tenant_id, TenantStatus::Active, TenantStatus::Suspended)
            .await
    }

    /// Resume a suspended tenant.
    pub async fn resume_tenant(&self, tenant_id: &str) -> Result<TenantModel, ProvisionerError> {
        self.transition(tenant_id, TenantStatus::Suspended, TenantStatus::Active)
            .await
    }

    /// Delete a tenant. The dedicated database is dropped first; the
    /// directory entry goes only after the drop succeeds.
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<(), ProvisionerError> {
        let repo = TenantRepository::new(&self.db);
        let tenant = repo
            .get_tenant_by_tenant_id(tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

        self.drop_database(&tenant.db_name).await?;
        repo.delete_tenant(tenant.id).await?;
        info!(tenant_id, "Tenant deleted");

        Ok(())
    }

    async fn transition(
        &self,
        tenant_id: &str,
        from: TenantStatus,
        to: TenantStatus,
    ) -> Result<TenantModel, ProvisionerError> {
        let repo = TenantRepository::new(&self.db);
        let tenant = repo
            .get_tenant_by_tenant_id(tenant_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("Tenant not found".to_string()))?;

        if tenant.status != from.as_str() {
            return Err(ProvisionerError::InvalidTransition {
                tenant_id: tenant_id.to_string(),
                from: from.as_str(),
                to: to.as_str(),
            });
        }

        Ok(repo.set_status(tenant.id, to).await?)
    }

    async fn create_database(&self, db_name: &str) -> Result<(), ProvisionerError> {
        // SQLite creates databases on first connect; only Postgres needs
        // an explicit statement.
        if self.db.get_database_backend() != DatabaseBackend::Postgres {
            return Ok(());
        }

        let stmt = Statement::from_string(
            DatabaseBackend::Postgres,
            format!("CREATE DATABASE {}", quote_ident(db_name)),
        );
        self.db.execute(stmt).await?;
        Ok(())
    }

    async fn drop_database(&self, db_name: &str) -> Result<(), ProvisionerError> {
        if self.db.get_database_backend() != DatabaseBackend::Postgres {
            return Ok(());
        }

        let stmt = Statement::from_string(
            DatabaseBackend::Postgres,
            format!("DROP DATABASE IF EXISTS {}", quote_ident(db_name)),
        );
        if let Err(e) = self.db.execute(stmt).await {
            warn!(db_name, error = %e, "Failed to drop tenant database");
            return Err(e.into());
        }
        Ok(())
    }
}

/// Derive the dedicated database name from the public tenant id.
pub fn db_name_for(tenant_id: &str) -> String {
    format!("tenant_{}", tenant_id.replace('-', "_"))
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_name_for() {
        assert_eq!(db_name_for("acme"), "tenant_acme");
        assert_eq!(db_name_for("acme-corp"), "tenant_acme_corp");
    }

    #[test]
    fn test_quote_ident_strips_quotes() {
        assert_eq!(quote_ident("tenant_acme"), "\"tenant_acme\"");
        assert_eq!(quote_ident("weird\"name"), "\"weirdname\"");
    }
}
