//! Axum extractors for authentication.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;
use crate::jwt::JwtError;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Core bearer authentication: a signature check plus a clock comparison.
/// No database access.
fn authenticate_request<S>(parts: &Parts, state: &S) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend,
{
    let token = bearer_token(&parts.headers).ok_or(AuthErrorKind::NotAuthenticated)?;

    match state.jwt().validate_access_token(token) {
        Ok(claims) => Ok(AuthenticatedUser { claims }),
        Err(JwtError::Expired) => Err(AuthErrorKind::TokenExpired),
        Err(JwtError::TimeError) => {
            tracing::error!("System clock is before the Unix epoch");
            Err(AuthErrorKind::Internal)
        }
        Err(_) => Err(AuthErrorKind::InvalidToken),
    }
}

/// Extractor for endpoints that require a valid access token.
///
/// This is the seam downstream services use: it needs only the signing secret.
/// Missing or forged tokens are rejected with 401, expired ones with 403.
pub struct BearerAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state)
            .map(BearerAuth)
            .map_err(ApiAuthError::from)
    }
}
