//! # Data Models
//!
//! This module contains all the data models used throughout the tenancy
//! service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod tenant;
pub mod tenant_user;
pub mod user;

pub use tenant::Entity as Tenant;
pub use tenant_user::Entity as TenantUser;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "tenancy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
