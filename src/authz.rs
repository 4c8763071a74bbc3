//! # Authorization model
//!
//! Two-level checks derived from a verified [`Identity`]: global roles apply
//! across the whole system, tenant roles apply within one tenant. Tenant
//! membership is resolved first ([`resolve_tenant`]), then individual
//! capabilities are checked against the effective role set.

use std::collections::HashSet;

use thiserror::Error;
use uuid::Uuid;

use crate::token::Identity;

/// Authorization error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    /// The identity has no binding to the requested tenant. Distinct from
    /// role insufficiency and from "tenant does not exist".
    #[error("access to tenant denied")]
    TenantAccessDenied,
    /// The identity has tenant access but lacks the required capability.
    #[error("insufficient permissions")]
    Denied,
}

/// The tenant-scoped role set produced by resolving a request's tenant id
/// against the caller's identity. Passed to guards and alongside pool
/// acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveTenantRoles {
    pub tenant_id: String,
    roles: HashSet<String>,
}

impl EffectiveTenantRoles {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Confirm the identity is bound to `requested_tenant_id` and produce its
/// effective tenant-scoped roles.
///
/// Global roles do not grant tenant membership: an identity without a
/// binding is denied regardless of `global_roles`.
pub fn resolve_tenant(
    identity: &Identity,
    requested_tenant_id: &str,
) -> Result<EffectiveTenantRoles, AccessError> {
    let grant = identity
        .tenant_grant(requested_tenant_id)
        .ok_or(AccessError::TenantAccessDenied)?;

    Ok(EffectiveTenantRoles {
        tenant_id: grant.tenant_id.clone(),
        roles: grant.roles.iter().cloned().collect(),
    })
}

/// Require a global role on the identity.
pub fn require_global_role(identity: &Identity, role: &str) -> Result<(), AccessError> {
    if identity.has_global_role(role) {
        Ok(())
    } else {
        Err(AccessError::Denied)
    }
}

/// Require a role within the already-resolved tenant scope.
pub fn require_tenant_role(effective: &EffectiveTenantRoles, role: &str) -> Result<(), AccessError> {
    if effective.has_role(role) {
        Ok(())
    } else {
        Err(AccessError::Denied)
    }
}

/// One clause of a composed requirement.
pub enum Requirement<'a> {
    GlobalRole(&'a str),
    TenantRole(&'a EffectiveTenantRoles, &'a str),
}

/// Allow if any clause is satisfied. Evaluation short-circuits on the
/// first satisfied clause.
pub fn require_any(identity: &Identity, clauses: &[Requirement<'_>]) -> Result<(), AccessError> {
    for clause in clauses {
        let satisfied = match clause {
            Requirement::GlobalRole(role) => identity.has_global_role(role),
            Requirement::TenantRole(effective, role) => effective.has_role(role),
        };
        if satisfied {
            return Ok(());
        }
    }
    Err(AccessError::Denied)
}

/// Self-action guard: a user may not target their own account with an
/// elevated operation (removing their own admin role, removing themselves
/// from a tenant).
pub fn forbid_self_target(identity: &Identity, target_user_id: Uuid) -> Result<(), AccessError> {
    if identity.user_id == target_user_id {
        Err(AccessError::Denied)
    } else {
        Ok(())
    }
}
