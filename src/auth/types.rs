//! Authentication user types.

use crate::jwt::AccessClaims;

/// Authenticated caller, taken from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// JWT claims from the access token
    pub claims: AccessClaims,
}

impl AuthenticatedUser {
    /// Public user ID (UUID) the token was issued for.
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }
}
