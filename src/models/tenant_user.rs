//! Tenant-user binding entity model
//!
//! This module contains the SeaORM entity model for the tenant_users table,
//! binding a user to a tenant with a set of tenant-scoped roles. The
//! (user_id, tenant_id) pair is unique: one binding per user per tenant.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Membership of a user in a tenant
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenant_users")]
pub struct Model {
    /// Unique identifier for the binding (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// The bound user
    pub user_id: Uuid,

    /// The tenant the user is bound to
    pub tenant_id: Uuid,

    /// Tenant-scoped roles, stored as a JSON array of strings
    pub roles: Json,

    /// Binding status: pending, active, or revoked
    pub status: String,

    /// Timestamp when the binding was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the binding was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
