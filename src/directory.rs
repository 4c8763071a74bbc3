//! # Tenant directory
//!
//! Read-side lookup of tenant metadata: tenant id to status and encrypted
//! connection credentials. The trait boundary lets the pool run against a
//! fake directory in tests; the production implementation reads the master
//! database through SeaORM.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use thiserror::Error;

use crate::models::tenant::{Column as TenantColumn, Entity as Tenant, Model as TenantModel};

/// Directory lookup failure. A missing tenant is not an error; it is the
/// `Ok(None)` case.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory query failed: {0}")]
    Query(#[from] sea_orm::DbErr),
}

/// Tenant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStatus {
    Pending,
    Active,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Pending => "pending",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TenantStatus::Pending),
            "active" => Some(TenantStatus::Active),
            "suspended" => Some(TenantStatus::Suspended),
            _ => None,
        }
    }
}

/// One directory record. The encrypted connection string stays inside the
/// core; it is never serialized into a response or log.
#[derive(Debug, Clone)]
pub struct TenantRecord {
    pub tenant_id: String,
    pub name: String,
    pub status: TenantStatus,
    pub db_name: String,
    pub encrypted_connection_string: String,
}

impl TenantRecord {
    fn from_model(model: TenantModel) -> Option<Self> {
        let status = TenantStatus::parse(&model.status)?;
        Some(Self {
            tenant_id: model.tenant_id,
            name: model.name,
            status,
            db_name: model.db_name,
            encrypted_connection_string: model.encrypted_connection_string,
        })
    }
}

/// Authoritative store of tenant metadata and encrypted credentials.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Look up a tenant by its public id. Stateless read; concurrent
    /// lookups for the same id are safe.
    async fn lookup(&self, tenant_id: &str) -> Result<Option<TenantRecord>, DirectoryError>;
}

/// Directory backed by the master database.
pub struct MasterDirectory {
    db: DatabaseConnection,
}

impl MasterDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantDirectory for MasterDirectory {
    async fn lookup(&self, tenant_id: &str) -> Result<Option<TenantRecord>, DirectoryError> {
        let model = Tenant::find()
            .filter(TenantColumn::TenantId.eq(tenant_id))
            .one(&self.db)
            .await?;

        // A row with an unknown status string is unusable; treat it as
        // absent rather than guessing a lifecycle state.
        Ok(model.and_then(TenantRecord::from_model))
    }
}
