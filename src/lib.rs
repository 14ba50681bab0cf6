pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod credentials;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod tokens;

use api::create_api_router;
use auth::CookieSettings;
use axum::Router;
use credentials::CredentialStore;
use db::Database;
use jwt::JwtConfig;
use password::{PasswordError, PasswordHasher};
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokens::{RefreshPolicy, TokenService};
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Base path for the application (e.g., "/api"). Auth routes live at {base}/auth.
    pub base: Option<String>,
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing access tokens
    pub jwt_secret: Vec<u8>,
    /// Whether to set `Secure; SameSite=None` on the refresh cookie (HTTPS deployments)
    pub secure_cookies: bool,
    /// Whether refresh secrets are reused or rotated on every refresh
    pub refresh_policy: RefreshPolicy,
    /// Argon2 memory cost in KiB
    pub hash_memory_kib: u32,
    /// Argon2 iteration count
    pub hash_iterations: u32,
    /// Signin attempts per minute per IP (0 disables the limit)
    pub signin_per_minute: u32,
    /// Signups per minute per IP (0 disables the limit)
    pub signup_per_minute: u32,
    /// Trust `X-Forwarded-For` for the client IP (only behind a reverse proxy)
    pub trust_forwarded_for: bool,
}

/// Errors that stop the server from starting or running.
#[derive(Debug)]
pub enum ServerError {
    Password(PasswordError),
    Io(std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Password(e) => write!(f, "{}", e),
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<PasswordError> for ServerError {
    fn from(e: PasswordError) -> Self {
        ServerError::Password(e)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e)
    }
}

/// Per-IP limiters for the signin and signup routes.
pub fn create_rate_limits(config: &ServerConfig) -> Arc<RateLimitConfig> {
    Arc::new(RateLimitConfig::new(
        config.signin_per_minute,
        config.signup_per_minute,
        config.trust_forwarded_for,
    ))
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, ServerError> {
    create_app_with_rate_limits(config, create_rate_limits(config))
}

/// Create the application router around existing limiters, so the cleanup
/// task can prune the same buckets the routes fill.
pub fn create_app_with_rate_limits(
    config: &ServerConfig,
    rate_limit: Arc<RateLimitConfig>,
) -> Result<Router, ServerError> {
    let jwt = Arc::new(JwtConfig::new(&config.jwt_secret));
    let tokens = TokenService::new(jwt.clone(), config.db.clone(), config.refresh_policy);

    let hasher = PasswordHasher::new(config.hash_memory_kib, config.hash_iterations)?;
    let credentials = CredentialStore::new(config.db.clone(), hasher);

    let base_path = config.base.as_deref().unwrap_or("").trim_end_matches('/');
    let cookies = CookieSettings {
        path: format!("{}/auth", base_path),
        secure: config.secure_cookies,
    };

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        tokens,
        credentials,
        cookies,
        rate_limit,
    );

    if base_path.is_empty() {
        Ok(api_router)
    } else {
        Ok(Router::new().nest(base_path, api_router))
    }
}

/// Run cleanup tasks and spawn background scheduler.
pub async fn init_cleanup(db: &Database, rate_limit: Arc<RateLimitConfig>) {
    cleanup::run_cleanup(db, &rate_limit).await;
    cleanup::spawn_cleanup_scheduler(db.clone(), rate_limit);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Cleanup runs once before serving and then hourly in the background.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), ServerError> {
    let rate_limit = create_rate_limits(&config);
    let app = create_app_with_rate_limits(&config, rate_limit.clone())?;
    init_cleanup(&config.db, rate_limit).await;

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await?;
    Ok(())
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), ServerError> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
