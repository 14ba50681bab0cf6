//! Refresh cookie parsing and construction.

use axum::http::header;

/// Cookie name for the refresh token (long-lived, 2 weeks).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                if value.is_empty() {
                    return None;
                }
                return Some(value);
            }
        }
    }
    None
}

/// Attributes shared by every refresh cookie the server writes.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Path the cookie is scoped to (the auth route prefix).
    pub path: String,
    /// Emit `Secure; SameSite=None` so the cookie works cross-site over HTTPS.
    /// Plain-HTTP deployments get `SameSite=Lax` instead, since browsers drop
    /// `SameSite=None` cookies without `Secure`.
    pub secure: bool,
}

impl CookieSettings {
    fn attributes(&self) -> String {
        let same_site = if self.secure {
            "; Secure; SameSite=None"
        } else {
            "; SameSite=Lax"
        };
        format!("HttpOnly; Path={}{}", self.path, same_site)
    }

    /// Set-Cookie value carrying a refresh secret.
    pub fn refresh_cookie(&self, secret: &str, max_age: u64) -> String {
        format!(
            "{}={}; {}; Max-Age={}",
            REFRESH_COOKIE_NAME,
            secret,
            self.attributes(),
            max_age
        )
    }

    /// Set-Cookie value that deletes the refresh cookie.
    pub fn clear_refresh_cookie(&self) -> String {
        format!("{}=; {}; Max-Age=0", REFRESH_COOKIE_NAME, self.attributes())
    }
}
