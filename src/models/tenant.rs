//! Tenant entity model
//!
//! This module contains the SeaORM entity model for the tenants table, the
//! authoritative directory of tenants and their encrypted database
//! credentials.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Tenant directory entry
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Surrogate primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Public tenant identifier used in URLs and tokens (unique)
    #[sea_orm(unique)]
    pub tenant_id: String,

    /// Display name for the tenant
    pub name: String,

    /// Lifecycle status: pending, active, suspended
    pub status: String,

    /// Name of the tenant's dedicated database
    pub db_name: String,

    /// Connection string, encrypted at rest as `<ivHex>:<cipherHex>`.
    /// Never serialized into responses or logs.
    pub encrypted_connection_string: String,

    /// Timestamp when the tenant was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the tenant was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tenant_user::Entity")]
    TenantUser,
}

impl Related<super::tenant_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TenantUser.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
