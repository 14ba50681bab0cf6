//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::api::ApiError;
use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Bucket key for requests whose client IP cannot be determined
/// (e.g. the router is driven without `ConnectInfo`).
const UNKNOWN_CLIENT: &str = "unknown";

/// Default signin attempts per minute per IP.
pub const DEFAULT_SIGNIN_PER_MINUTE: u32 = 10;

/// Default signups per minute per IP.
pub const DEFAULT_SIGNUP_PER_MINUTE: u32 = 3;

/// Rate limiting configuration for authentication endpoints.
/// A limiter is `None` when its limit is configured as zero (disabled).
#[derive(Clone)]
pub struct RateLimitConfig {
    pub signin: Option<Arc<IpLimiter>>,
    pub signup: Option<Arc<IpLimiter>>,
    pub trust_forwarded_for: bool,
}

fn per_minute(limit: u32) -> Option<Arc<IpLimiter>> {
    NonZeroU32::new(limit).map(|n| Arc::new(RateLimiter::keyed(Quota::per_minute(n))))
}

impl RateLimitConfig {
    pub fn new(signin_per_minute: u32, signup_per_minute: u32, trust_forwarded_for: bool) -> Self {
        Self {
            signin: per_minute(signin_per_minute),
            signup: per_minute(signup_per_minute),
            trust_forwarded_for,
        }
    }

    /// Drop buckets that have refilled completely. Returns how many remain.
    pub fn prune(&self) -> usize {
        [&self.signin, &self.signup]
            .into_iter()
            .flatten()
            .map(|limiter| {
                limiter.retain_recent();
                limiter.shrink_to_fit();
                limiter.len()
            })
            .sum()
    }
}

fn check(limiter: Option<&IpLimiter>, request: &Request, trust_forwarded_for: bool) -> bool {
    let Some(limiter) = limiter else {
        return true;
    };
    let ip = extract_client_ip(request, trust_forwarded_for)
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    limiter.check_key(&ip).is_ok()
}

/// Middleware for rate limiting signin.
pub async fn rate_limit_signin(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if check(
        config.signin.as_deref(),
        &request,
        config.trust_forwarded_for,
    ) {
        next.run(request).await
    } else {
        tracing::warn!("Signin rate limit exceeded");
        ApiError::too_many_requests(
            "Too many authentication attempts. Please wait before trying again.",
        )
        .into_response()
    }
}

/// Middleware for rate limiting signup.
pub async fn rate_limit_signup(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if check(
        config.signup.as_deref(),
        &request,
        config.trust_forwarded_for,
    ) {
        next.run(request).await
    } else {
        tracing::warn!("Signup rate limit exceeded");
        ApiError::too_many_requests(
            "Too many signup attempts. Please wait before trying again.",
        )
        .into_response()
    }
}
