//! Access token generation and validation.
//!
//! Access tokens are signed HS256 JWTs. They are never stored, so verifying one
//! needs only the signing secret and the clock.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type marker, so other JWTs signed with the same secret are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access token duration: 30 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 30 * 60;

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Generate an access token for a user, valid for 30 minutes from now.
    pub fn generate_access_token(&self, user_uuid: &str) -> Result<AccessTokenResult, JwtError> {
        self.generate_access_token_at(user_uuid, now_secs()?)
    }

    /// Generate an access token as if issued at `issued_at`.
    pub fn generate_access_token_at(
        &self,
        user_uuid: &str,
        issued_at: u64,
    ) -> Result<AccessTokenResult, JwtError> {
        let exp = issued_at + ACCESS_TOKEN_DURATION_SECS;

        let claims = AccessClaims {
            sub: user_uuid.to_string(),
            token_type: TokenType::Access,
            iat: issued_at,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            issued_at,
            expires_at: exp,
        })
    }

    /// Validate and decode an access token against the current time.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        self.validate_access_token_at(token, now_secs()?)
    }

    /// Validate and decode an access token against the given time.
    ///
    /// The token is expired once `now >= exp`. Signature and shape are checked first,
    /// so a forged token is `Invalid` even if its claimed expiry has passed.
    pub fn validate_access_token_at(&self, token: &str, now: u64) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is compared below so the boundary is exact.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }

        if now >= token_data.claims.exp {
            return Err(JwtError::Expired);
        }

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature or malformed token
    Decoding(jsonwebtoken::errors::Error),
    /// Token is well-formed and signed but past its expiry
    Expired,
    /// System time error
    TimeError,
    /// Wrong token type
    WrongTokenType,
}

impl JwtError {
    /// Whether the token was genuine but stale, as opposed to forged or garbled.
    pub fn is_expired(&self) -> bool {
        matches!(self, JwtError::Expired)
    }
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}
