//! Migration to create the tenant membership table.
//!
//! Binds a user to a tenant with a JSON array of tenant-scoped roles. A user
//! can be bound to a tenant at most once.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TenantUsers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantUsers::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TenantUsers::UserId).uuid().not_null())
                    .col(ColumnDef::new(TenantUsers::TenantId).uuid().not_null())
                    .col(ColumnDef::new(TenantUsers::Roles).json().not_null())
                    .col(ColumnDef::new(TenantUsers::Status).text().not_null())
                    .col(
                        ColumnDef::new(TenantUsers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TenantUsers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenant_users_user")
                            .from(TenantUsers::Table, TenantUsers::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenant_users_tenant")
                            .from(TenantUsers::Table, TenantUsers::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_users_user_tenant")
                    .table(TenantUsers::Table)
                    .col(TenantUsers::UserId)
                    .col(TenantUsers::TenantId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TenantUsers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TenantUsers {
    Table,
    Id,
    UserId,
    TenantId,
    Roles,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
