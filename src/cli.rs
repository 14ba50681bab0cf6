//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::password::{DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB};
use crate::rate_limit::{DEFAULT_SIGNIN_PER_MINUTE, DEFAULT_SIGNUP_PER_MINUTE};
use crate::tokens::RefreshPolicy;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Railpass",
    about = "Account and session service for the ticketing platform"
)]
pub struct Args {
    /// Base path prefix. Auth routes are served at {base}/auth
    #[arg(short, long, value_parser = validate_base_path)]
    pub base: Option<String>,

    /// Port to listen on
    #[arg(short, long, default_value = "7292")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "railpass.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Mark the refresh cookie `Secure; SameSite=None` (required for HTTPS cross-site clients)
    #[arg(long, env = "RAILPASS_SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Replace the refresh secret on every refresh instead of reusing it until expiry
    #[arg(long, env = "RAILPASS_ROTATE_REFRESH")]
    pub rotate_refresh: bool,

    /// Argon2 memory cost in KiB
    #[arg(long, default_value_t = DEFAULT_MEMORY_KIB)]
    pub hash_memory_kib: u32,

    /// Argon2 iteration count
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    pub hash_iterations: u32,

    /// Signin attempts per minute per IP (0 disables)
    #[arg(long, default_value_t = DEFAULT_SIGNIN_PER_MINUTE)]
    pub signin_per_minute: u32,

    /// Signups per minute per IP (0 disables)
    #[arg(long, default_value_t = DEFAULT_SIGNUP_PER_MINUTE)]
    pub signup_per_minute: u32,

    /// Use X-Forwarded-For for the client IP. Only enable behind a reverse proxy
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_base_path(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Ok(String::new());
    }

    if !s.starts_with('/') {
        return Err(format!("Base path must start with '/': {}", s));
    }

    if s.len() > 1 && s.ends_with('/') {
        return Err(format!("Base path must not end with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Base path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
/// Verbosity comes from `RUST_LOG`, defaulting to `info`.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    let refresh_policy = if args.rotate_refresh {
        RefreshPolicy::Rotate
    } else {
        RefreshPolicy::Reuse
    };

    ServerConfig {
        base: args.base.clone(),
        db,
        jwt_secret: jwt_secret.into_bytes(),
        secure_cookies: args.secure_cookies,
        refresh_policy,
        hash_memory_kib: args.hash_memory_kib,
        hash_iterations: args.hash_iterations,
        signin_per_minute: args.signin_per_minute,
        signup_per_minute: args.signup_per_minute,
        trust_forwarded_for: args.trust_forwarded_for,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
