//! Authentication endpoints.
//!
//! - POST `/signup` - Create an account (no session side effects)
//! - POST `/signin` - Verify credentials, return an access token, set the refresh cookie
//! - POST `/signout` - Revoke the refresh cookie's session and clear the cookie
//! - GET `/refresh` - Exchange the refresh cookie for a new access token
//! - GET `/me` - Profile of the bearer token's user
//! - GET `/sessions` - List the caller's active sessions
//! - POST `/signout-all` - Revoke every session of the caller

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt};
use crate::auth::{BearerAuth, ClientIp, CookieSettings, REFRESH_COOKIE_NAME, get_cookie};
use crate::credentials::{CredentialError, CredentialStore, NewAccount};
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::{JwtConfig, now_secs};
use crate::rate_limit::{RateLimitConfig, rate_limit_signin, rate_limit_signup};
use crate::tokens::{RefreshPolicy, TokenError, TokenService};

/// Returned for both unknown identifiers and wrong passwords.
const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Returned for any username/email collision, without naming the field.
const IDENTITY_TAKEN: &str = "An account with these details already exists";

const MAX_USERNAME_LEN: usize = 32;
const MAX_EMAIL_LEN: usize = 254;
const MAX_NAME_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub tokens: TokenService,
    pub credentials: CredentialStore,
    pub cookies: CookieSettings,
    pub trust_forwarded_for: bool,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState, rate_limit: Arc<RateLimitConfig>) -> Router {
    let signin_router = Router::new()
        .route("/signin", post(signin))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            rate_limit.clone(),
            rate_limit_signin,
        ));

    let signup_router = Router::new()
        .route("/signup", post(signup))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_signup));

    Router::new()
        .route("/signout", post(signout))
        .route("/refresh", get(refresh))
        .route("/me", get(me))
        .route("/sessions", get(list_sessions))
        .route("/signout-all", post(signout_all))
        .with_state(state)
        .merge(signin_router)
        .merge(signup_router)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SignupRequest {
    firstname: String,
    lastname: String,
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SigninRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigninResponse {
    message: &'static str,
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    id: String,
    username: String,
    email: String,
    display_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    id: i64,
    last_ip: Option<String>,
    expires_at: i64,
    created_at: String,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

fn required<'a>(value: &'a str, field: &str, max_len: usize) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(ApiError::bad_request(format!(
            "{} cannot be longer than {} characters",
            field, max_len
        )));
    }
    Ok(value)
}

impl SignupRequest {
    /// Check every field before anything touches the store.
    fn validate(self) -> Result<NewAccount, ApiError> {
        let first_name = required(&self.firstname, "firstname", MAX_NAME_LEN)?;
        let last_name = required(&self.lastname, "lastname", MAX_NAME_LEN)?;
        let username = required(&self.username, "username", MAX_USERNAME_LEN)?;
        let email = required(&self.email, "email", MAX_EMAIL_LEN)?;

        // Only allow alphanumeric and underscores
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ApiError::bad_request(
                "Username can only contain letters, numbers, and underscores",
            ));
        }

        let well_formed_email = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !email.chars().any(char::is_whitespace)
                    // Identity lookups fold case with NOCASE, which is ASCII only
                    && email.is_ascii()
            }
            None => false,
        };
        if !well_formed_email {
            return Err(ApiError::bad_request("Email is not a valid address"));
        }

        let password_len = self.password.chars().count();
        if password_len < MIN_PASSWORD_LEN || password_len > MAX_PASSWORD_LEN {
            return Err(ApiError::bad_request(format!(
                "Password must be between {} and {} characters",
                MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
            )));
        }

        Ok(NewAccount {
            username: username.to_string(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            password: self.password,
        })
    }
}

async fn signup(
    State(state): State<AuthState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = body?;
    let account = payload.validate()?;

    match state.credentials.create(account).await {
        Ok(_) => Ok((
            StatusCode::CREATED,
            Json(MessageResponse {
                message: "Account created",
            }),
        )),
        Err(CredentialError::Conflict) => Err(ApiError::conflict(IDENTITY_TAKEN)),
        Err(e) => Err(ApiError::db_error("Failed to create user", e)),
    }
}

async fn signin(
    State(state): State<AuthState>,
    ClientIp(client_ip): ClientIp,
    body: Result<Json<SigninRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = body?;

    let identifier = payload.username.trim();
    if identifier.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    if payload.password.chars().count() > MAX_PASSWORD_LEN {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let user = match state.credentials.verify(identifier, &payload.password).await {
        Ok(user) => user,
        Err(CredentialError::InvalidCredentials) => {
            info!(ip = ?client_ip, "Signin failed");
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
        Err(e) => return Err(ApiError::db_error("Failed to verify credentials", e)),
    };

    let access = state
        .tokens
        .issue_access_token(&user.uuid)
        .internal_err("Failed to generate access token")?;

    let refresh = state
        .tokens
        .issue_refresh_token(user.id, client_ip.as_deref())
        .await
        .db_err("Failed to store refresh token")?;

    info!(user_id = user.id, "Signed in");

    let cookie = state.cookies.refresh_cookie(&refresh.secret, refresh.duration);

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(SigninResponse {
            message: "Signed in",
            access_token: access.token,
        }),
    ))
}

/// Signout is idempotent: 204 whether or not a session existed.
async fn signout(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let clear = AppendHeaders([(SET_COOKIE, state.cookies.clear_refresh_cookie())]);

    if let Some(secret) = get_cookie(&headers, REFRESH_COOKIE_NAME) {
        if let Err(e) = state.tokens.revoke(secret).await {
            return (clear, ApiError::db_error("Failed to revoke session", e)).into_response();
        }
    }

    (StatusCode::NO_CONTENT, clear).into_response()
}

/// Reject a refresh attempt and drop the client's cookie.
fn reject_refresh(cookies: &CookieSettings, msg: &str) -> Response {
    (
        AppendHeaders([(SET_COOKIE, cookies.clear_refresh_cookie())]),
        ApiError::forbidden(msg),
    )
        .into_response()
}

/// Reject a refresh that lost a rotation race. The cookie is left alone, since
/// a client sharing the jar may already hold the winner's new secret.
fn lost_rotation() -> Response {
    ApiError::forbidden("Invalid refresh token").into_response()
}

async fn refresh(
    State(state): State<AuthState>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let secret = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiError::unauthorized("No refresh token"))?;

    let session = match state.tokens.rotate_or_reject(secret).await {
        Ok(session) => session,
        Err(TokenError::Invalid) => {
            info!("Refresh with unknown or revoked token");
            return Ok(reject_refresh(&state.cookies, "Invalid refresh token"));
        }
        Err(TokenError::Expired) => {
            return Ok(reject_refresh(&state.cookies, "Refresh token expired"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to check refresh token", e)),
    };

    let Some(user) = state
        .db
        .users()
        .get_by_id(session.user_id)
        .await
        .db_err("Failed to get user")?
    else {
        state
            .tokens
            .revoke(secret)
            .await
            .db_err("Failed to revoke orphaned session")?;
        return Ok(reject_refresh(&state.cookies, "Invalid refresh token"));
    };

    // Update IP if changed
    if let Some(ref ip) = client_ip {
        if session.last_ip.as_ref() != Some(ip) {
            if let Err(e) = state.db.sessions().update_ip(secret, ip).await {
                warn!("Failed to update session IP: {}", e);
            }
        }
    }

    let access = state
        .tokens
        .issue_access_token(&user.uuid)
        .internal_err("Failed to generate access token")?;

    let body = Json(RefreshResponse {
        access_token: access.token,
    });

    match state.tokens.policy() {
        RefreshPolicy::Reuse => Ok((StatusCode::OK, body).into_response()),
        RefreshPolicy::Rotate => match state.tokens.rotate(&session).await {
            Ok(rotated) => {
                let cookie = state
                    .cookies
                    .refresh_cookie(&rotated.secret, rotated.duration);
                Ok((StatusCode::OK, [(SET_COOKIE, cookie)], body).into_response())
            }
            Err(TokenError::Invalid) => {
                warn!(user_id = user.id, "Refresh token reused during rotation");
                Ok(lost_rotation())
            }
            Err(e) => Err(ApiError::db_error("Failed to rotate refresh token", e)),
        },
    }
}

async fn me(
    State(state): State<AuthState>,
    BearerAuth(auth): BearerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.user_id())
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

    Ok(Json(MeResponse {
        display_name: user.display_name(),
        id: user.uuid,
        username: user.username,
        email: user.email,
    }))
}

async fn list_sessions(
    State(state): State<AuthState>,
    BearerAuth(auth): BearerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.user_id())
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

    let now = now_secs().internal_err("Failed to read clock")?;
    let sessions = state
        .db
        .sessions()
        .list_by_user(user.id, now)
        .await
        .db_err("Failed to list sessions")?;

    Ok(Json(ListSessionsResponse {
        sessions: sessions
            .into_iter()
            .map(|s| SessionInfo {
                id: s.id,
                last_ip: s.last_ip,
                expires_at: s.expires_at,
                created_at: s.created_at,
            })
            .collect(),
    }))
}

/// Revoke every session of the caller (logout everywhere).
async fn signout_all(
    State(state): State<AuthState>,
    BearerAuth(auth): BearerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.user_id())
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

    let revoked = state
        .db
        .sessions()
        .delete_all_by_user(user.id)
        .await
        .db_err("Failed to revoke sessions")?;

    info!(user_id = user.id, revoked, "Signed out everywhere");

    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(SET_COOKIE, state.cookies.clear_refresh_cookie())]),
    ))
}
