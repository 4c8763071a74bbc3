//! Database migrations for the tenancy service master database.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_10_000001_create_users;
mod m2026_01_10_000002_create_tenants;
mod m2026_01_10_000003_create_tenant_users;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_10_000001_create_users::Migration),
            Box::new(m2026_01_10_000002_create_tenants::Migration),
            Box::new(m2026_01_10_000003_create_tenant_users::Migration),
        ]
    }
}
