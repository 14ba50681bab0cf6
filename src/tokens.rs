//! Token service: access token minting/verification and the refresh credential
//! lifecycle.
//!
//! Dual-token system:
//! - Access tokens: short-lived (30 min), stateless JWTs, never stored
//! - Refresh tokens: long-lived (14 days), opaque random secrets tracked in the
//!   sessions table so they can be revoked

use base64::Engine;
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{Database, Session};
use crate::jwt::{AccessClaims, AccessTokenResult, JwtConfig, JwtError, now_secs};

/// Refresh token duration: 2 weeks
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

/// Refresh secret size in bytes (256 bits of entropy).
const REFRESH_SECRET_BYTES: usize = 32;

/// What happens to a refresh secret when it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// The same secret stays valid until its original expiry.
    #[default]
    Reuse,
    /// Every successful refresh replaces the secret and invalidates the old one.
    Rotate,
}

/// A freshly issued refresh credential.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The opaque secret (goes into the cookie)
    pub secret: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Errors from the token service.
#[derive(Debug)]
pub enum TokenError {
    /// Unknown secret, bad signature, or malformed token.
    Invalid,
    /// Genuine credential past its expiry.
    Expired,
    Jwt(JwtError),
    Database(sqlx::Error),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Invalid => write!(f, "Invalid token"),
            TokenError::Expired => write!(f, "Token expired"),
            TokenError::Jwt(e) => write!(f, "{}", e),
            TokenError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<sqlx::Error> for TokenError {
    fn from(e: sqlx::Error) -> Self {
        TokenError::Database(e)
    }
}

/// Generate a new random refresh secret, base64url encoded.
fn generate_secret() -> String {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct TokenService {
    jwt: Arc<JwtConfig>,
    db: Database,
    policy: RefreshPolicy,
}

impl TokenService {
    pub fn new(jwt: Arc<JwtConfig>, db: Database, policy: RefreshPolicy) -> Self {
        Self { jwt, db, policy }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Mint an access token for a user.
    pub fn issue_access_token(&self, user_uuid: &str) -> Result<AccessTokenResult, TokenError> {
        self.jwt
            .generate_access_token(user_uuid)
            .map_err(TokenError::Jwt)
    }

    /// Verify an access token, returning its claims.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.jwt.validate_access_token(token).map_err(|e| match e {
            JwtError::Expired => TokenError::Expired,
            JwtError::TimeError => TokenError::Jwt(e),
            _ => TokenError::Invalid,
        })
    }

    /// Create a session for a user and return its secret.
    pub async fn issue_refresh_token(
        &self,
        user_id: i64,
        ip: Option<&str>,
    ) -> Result<RefreshTokenResult, TokenError> {
        let now = now_secs().map_err(TokenError::Jwt)?;
        self.issue_refresh_token_at(user_id, ip, now).await
    }

    /// Create a session as if issued at `now`.
    ///
    /// A secret collision fails the insert and is returned as an error.
    pub async fn issue_refresh_token_at(
        &self,
        user_id: i64,
        ip: Option<&str>,
        now: u64,
    ) -> Result<RefreshTokenResult, TokenError> {
        let secret = generate_secret();
        let expires_at = now + REFRESH_TOKEN_DURATION_SECS;

        self.db
            .sessions()
            .create(&secret, user_id, ip, expires_at)
            .await?;

        debug!(user_id, expires_at, "Refresh token issued");

        Ok(RefreshTokenResult {
            secret,
            expires_at,
            duration: REFRESH_TOKEN_DURATION_SECS,
        })
    }

    /// Check a refresh secret against the session store.
    ///
    /// Expired sessions are deleted on sight.
    pub async fn rotate_or_reject(&self, secret: &str) -> Result<Session, TokenError> {
        let now = now_secs().map_err(TokenError::Jwt)?;
        self.rotate_or_reject_at(secret, now).await
    }

    /// [`Self::rotate_or_reject`] against the given time.
    pub async fn rotate_or_reject_at(&self, secret: &str, now: u64) -> Result<Session, TokenError> {
        let sessions = self.db.sessions();

        let session = sessions
            .get_by_secret(secret)
            .await?
            .ok_or(TokenError::Invalid)?;

        if session.is_expired_at(now) {
            sessions.delete_by_secret(secret).await?;
            info!(user_id = session.user_id, "Expired refresh token removed");
            return Err(TokenError::Expired);
        }

        Ok(session)
    }

    /// Replace a session's secret with a new one valid for another 14 days.
    ///
    /// Fails with `Invalid` if the session was revoked or rotated concurrently.
    pub async fn rotate(&self, session: &Session) -> Result<RefreshTokenResult, TokenError> {
        let now = now_secs().map_err(TokenError::Jwt)?;
        let secret = generate_secret();
        let expires_at = now + REFRESH_TOKEN_DURATION_SECS;

        let replaced = self
            .db
            .sessions()
            .replace(&session.secret, &secret, expires_at)
            .await?;

        if !replaced {
            return Err(TokenError::Invalid);
        }

        debug!(user_id = session.user_id, "Refresh token rotated");

        Ok(RefreshTokenResult {
            secret,
            expires_at,
            duration: REFRESH_TOKEN_DURATION_SECS,
        })
    }

    /// Delete a session if present. Absence is not an error.
    pub async fn revoke(&self, secret: &str) -> Result<bool, TokenError> {
        Ok(self.db.sessions().delete_by_secret(secret).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;

    async fn service(policy: RefreshPolicy) -> (TokenService, Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db
            .users()
            .create(&NewUser {
                uuid: "uuid-1",
                username: "alice",
                email: "alice@x.com",
                password_hash: "hash",
                first_name: "Alice",
                last_name: "Liddell",
            })
            .await
            .unwrap();
        let jwt = Arc::new(JwtConfig::new(b"test-secret-key-for-testing"));
        (TokenService::new(jwt, db.clone(), policy), db, user_id)
    }

    #[test]
    fn test_secret_has_256_bits() {
        let secret = generate_secret();
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&secret)
            .unwrap();
        assert_eq!(decoded.len(), 32);
        assert_ne!(secret, generate_secret());
    }

    #[tokio::test]
    async fn test_access_token_round_trip() {
        let (service, _db, _) = service(RefreshPolicy::Reuse).await;

        let token = service.issue_access_token("uuid-1").unwrap();
        let claims = service.verify_access_token(&token.token).unwrap();
        assert_eq!(claims.sub, "uuid-1");

        assert!(matches!(
            service.verify_access_token("garbage"),
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_issue_refresh_token_persists_session() {
        let (service, db, user_id) = service(RefreshPolicy::Reuse).await;

        let result = service
            .issue_refresh_token_at(user_id, None, 1_000)
            .await
            .unwrap();
        assert_eq!(result.expires_at, 1_000 + REFRESH_TOKEN_DURATION_SECS);

        let session = db
            .sessions()
            .get_by_secret(&result.secret)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.expires_at as u64, result.expires_at);
    }

    #[tokio::test]
    async fn test_each_issue_creates_distinct_session() {
        let (service, db, user_id) = service(RefreshPolicy::Reuse).await;

        let a = service.issue_refresh_token(user_id, None).await.unwrap();
        let b = service.issue_refresh_token(user_id, None).await.unwrap();
        assert_ne!(a.secret, b.secret);

        let now = now_secs().unwrap();
        assert_eq!(db.sessions().list_by_user(user_id, now).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rotate_or_reject_unknown_secret() {
        let (service, _db, _) = service(RefreshPolicy::Reuse).await;

        assert!(matches!(
            service.rotate_or_reject("nope").await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_rotate_or_reject_valid_secret_is_reusable() {
        let (service, _db, user_id) = service(RefreshPolicy::Reuse).await;
        let issued = service.issue_refresh_token(user_id, None).await.unwrap();

        for _ in 0..3 {
            let session = service.rotate_or_reject(&issued.secret).await.unwrap();
            assert_eq!(session.user_id, user_id);
        }
    }

    #[tokio::test]
    async fn test_expired_secret_is_deleted_and_never_succeeds() {
        let (service, db, user_id) = service(RefreshPolicy::Reuse).await;
        let issued = service
            .issue_refresh_token_at(user_id, None, 1_000)
            .await
            .unwrap();

        let after = issued.expires_at + 1;
        assert!(matches!(
            service.rotate_or_reject_at(&issued.secret, after).await,
            Err(TokenError::Expired)
        ));
        assert!(
            db.sessions()
                .get_by_secret(&issued.secret)
                .await
                .unwrap()
                .is_none()
        );

        // Even "before" expiry, the row is gone for good
        assert!(matches!(
            service.rotate_or_reject_at(&issued.secret, 1_000).await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_revoked_secret_is_rejected_forever() {
        let (service, _db, user_id) = service(RefreshPolicy::Reuse).await;
        let issued = service.issue_refresh_token(user_id, None).await.unwrap();

        assert!(service.revoke(&issued.secret).await.unwrap());
        assert!(!service.revoke(&issued.secret).await.unwrap());

        for _ in 0..3 {
            assert!(service.rotate_or_reject(&issued.secret).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_rotate_invalidates_old_secret() {
        let (service, _db, user_id) = service(RefreshPolicy::Rotate).await;
        let issued = service.issue_refresh_token(user_id, None).await.unwrap();

        let session = service.rotate_or_reject(&issued.secret).await.unwrap();
        let rotated = service.rotate(&session).await.unwrap();

        assert_ne!(rotated.secret, issued.secret);
        assert!(matches!(
            service.rotate_or_reject(&issued.secret).await,
            Err(TokenError::Invalid)
        ));
        assert!(service.rotate_or_reject(&rotated.secret).await.is_ok());

        // Rotating the stale session again loses
        assert!(matches!(
            service.rotate(&session).await,
            Err(TokenError::Invalid)
        ));
    }
}
