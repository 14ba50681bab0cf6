mod auth;
mod error;

use axum::Router;
use std::sync::Arc;

use crate::auth::CookieSettings;
use crate::credentials::CredentialStore;
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::tokens::TokenService;

pub use auth::AuthState;
pub use error::{ApiError, ResultExt};

/// Create the API router. Authentication endpoints live under `/auth`.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    tokens: TokenService,
    credentials: CredentialStore,
    cookies: CookieSettings,
    rate_limit: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        db,
        jwt,
        tokens,
        credentials,
        cookies,
        trust_forwarded_for: rate_limit.trust_forwarded_for,
    };

    Router::new().nest("/auth", auth::router(auth_state, rate_limit))
}
