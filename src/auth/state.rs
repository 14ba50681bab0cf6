//! Authentication state traits and macro.

use crate::jwt::JwtConfig;

/// Trait for state types that can verify access tokens.
///
/// Only the signing key is needed, so services outside this one can mount
/// [`BearerAuth`](super::BearerAuth) with nothing but a [`JwtConfig`].
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
}

impl HasAuthBackend for JwtConfig {
    fn jwt(&self) -> &JwtConfig {
        self
    }
}

/// Trait for state types that know whether `X-Forwarded-For` may be trusted.
pub trait HasClientIpPolicy {
    fn trust_forwarded_for(&self) -> bool;
}

/// Macro to implement `HasAuthBackend` and `HasClientIpPolicy` for state
/// structs with the standard fields.
///
/// The struct must have these fields:
/// - `jwt: Arc<JwtConfig>`
/// - `trust_forwarded_for: bool`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub jwt: Arc<JwtConfig>,
///     pub trust_forwarded_for: bool,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &$crate::jwt::JwtConfig {
                &self.jwt
            }
        }

        impl $crate::auth::HasClientIpPolicy for $state_type {
            fn trust_forwarded_for(&self) -> bool {
                self.trust_forwarded_for
            }
        }
    };
}
