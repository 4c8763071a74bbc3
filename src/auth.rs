//! # Authentication middleware
//!
//! Verifies the bearer token on protected endpoints and attaches the
//! resulting [`Identity`] to the request. Authentication failures
//! short-circuit here: no authorization check or tenant pool code runs for
//! a request that fails token verification.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::error::{ApiError, unauthorized};
use crate::server::AppState;
use crate::token::{Identity, TokenKeys};

/// Extractor for the verified identity placed by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

impl FromRef<AppState> for Arc<TokenKeys> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.token_keys)
    }
}

/// Authentication middleware that validates bearer tokens.
pub async fn auth_middleware(
    State(keys): State<Arc<TokenKeys>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())?;
    let identity = keys.verify(token)?;

    tracing::debug!(user_id = %identity.user_id, "Authenticated request");

    let mut request = request;
    request.extensions_mut().insert(CurrentIdentity(identity));

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))
        .and_then(|value| {
            value
                .to_str()
                .map_err(|_| unauthorized(Some("Invalid Authorization header")))
        })
        .and_then(|header| {
            header
                .strip_prefix("Bearer ")
                .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
        })
}

impl<S> FromRequestParts<S> for CurrentIdentity
where
    Arc<TokenKeys>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentIdentity>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}
