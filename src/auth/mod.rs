//! Request authentication.
//!
//! Dual-token system: short-lived access tokens (30 min, stateless bearer
//! JWTs) and long-lived refresh tokens (14 days, opaque secrets in an HTTP-only
//! cookie, tracked in the sessions table).

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{CookieSettings, REFRESH_COOKIE_NAME, get_cookie};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{BearerAuth, bearer_token};
pub use ip::{ClientIp, HasHeadersAndExtensions, extract_client_ip};
pub use state::{HasAuthBackend, HasClientIpPolicy};
pub use types::AuthenticatedUser;
