//! # Identity and token verification
//!
//! A verified bearer token yields an [`Identity`]: global roles plus the
//! ordered list of (tenant, roles) grants. The identity lives for one
//! request and is reconstructed from the token on every call, never cached
//! server-side.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default token lifetime.
const TOKEN_TTL_SECONDS: i64 = 3600;

/// Authentication error types.
///
/// The variants are distinguished because callers behave differently:
/// expired prompts re-authentication, malformed and invalid-signature are
/// rejected outright.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token has expired")]
    TokenExpired,
    #[error("token is malformed")]
    TokenMalformed,
    #[error("token signature is invalid")]
    TokenInvalidSignature,
}

/// One tenant grant inside a token: the tenant and the roles the user
/// holds within it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantGrant {
    pub tenant_id: String,
    pub roles: Vec<String>,
}

/// JWT claims carried by issued tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    /// Global (cross-tenant) roles.
    #[serde(default)]
    pub global_roles: Vec<String>,
    /// Per-tenant role grants, in binding order.
    #[serde(default)]
    pub tenants: Vec<TenantGrant>,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
}

/// The verified claims of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub global_roles: Vec<String>,
    pub tenant_roles: Vec<TenantGrant>,
}

impl Identity {
    /// Whether the identity carries the given global role.
    pub fn has_global_role(&self, role: &str) -> bool {
        self.global_roles.iter().any(|r| r == role)
    }

    /// The grant for `tenant_id`, if the identity is bound to that tenant.
    pub fn tenant_grant(&self, tenant_id: &str) -> Option<&TenantGrant> {
        self.tenant_roles.iter().find(|g| g.tenant_id == tenant_id)
    }
}

/// Signing and verification keys, loaded once at startup from the
/// configured JWT secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a token for the user with their global roles and tenant grants.
    pub fn issue(
        &self,
        user_id: Uuid,
        global_roles: Vec<String>,
        tenants: Vec<TenantGrant>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            global_roles,
            tenants,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(TOKEN_TTL_SECONDS)).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Verify a bearer token and produce the request identity.
    ///
    /// Pure CPU work, no I/O. Authentication failures here short-circuit
    /// before any authorization or pool code runs.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map_err(
            |err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::TokenInvalidSignature,
                _ => AuthError::TokenMalformed,
            },
        )?;

        Ok(Identity {
            user_id: data.claims.sub,
            global_roles: data.claims.global_roles,
            tenant_roles: data.claims.tenants,
        })
    }
}
