//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for the master database entities: tenants, users and
//! tenant-user bindings.

pub mod tenant;
pub mod tenant_user;
pub mod user;

pub use tenant::{CreateTenantRecord, TenantRepository};
pub use tenant_user::TenantUserRepository;
pub use user::UserRepository;

/// Decode a JSON role column into a role list. Rows written by this service
/// always hold an array of strings; anything else decodes as empty.
pub(crate) fn roles_from_json(value: &serde_json::Value) -> Vec<String> {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

pub(crate) fn roles_to_json(roles: &[String]) -> serde_json::Value {
    serde_json::json!(roles)
}
