//! Authentication error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Internal auth error kind used by the bearer token extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No `Authorization: Bearer` header.
    NotAuthenticated,
    /// Bad signature or malformed token.
    InvalidToken,
    /// Genuine token past its expiry. The client should refresh.
    TokenExpired,
    /// Server-side failure (clock).
    Internal,
}

/// API authentication errors (JSON body).
///
/// Expiry maps to 403 so clients can tell "renew and retry" apart from
/// "never authenticated" (401).
#[derive(Debug)]
pub struct ApiAuthError(pub AuthErrorKind);

impl ApiAuthError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::TokenExpired => StatusCode::FORBIDDEN,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.0 {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            AuthErrorKind::InvalidToken => "Invalid token",
            AuthErrorKind::TokenExpired => "Token expired",
            AuthErrorKind::Internal => "Internal server error",
        }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self(kind)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
