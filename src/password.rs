//! Argon2id password hashing.
//!
//! Hashing is CPU and memory heavy, so async callers go through
//! [`PasswordHasher::hash_blocking`] and [`PasswordHasher::verify_blocking`],
//! which run on the blocking thread pool.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

/// Default memory cost in KiB (19 MiB).
pub const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;

/// Default number of iterations.
pub const DEFAULT_ITERATIONS: u32 = 2;

/// Argon2id hasher with a configurable cost.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    /// Hash of a random password, verified against when a login identifier
    /// is unknown so that path costs the same as a wrong password.
    dummy_hash: String,
}

impl PasswordHasher {
    /// Create a hasher with the given memory cost (KiB) and iteration count.
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, PasswordError> {
        let params =
            Params::new(memory_kib, iterations, 1, None).map_err(|_| PasswordError::Params)?;

        let mut hasher = Self {
            params,
            dummy_hash: String::new(),
        };
        let mut filler = [0u8; 16];
        rand::rng().fill_bytes(&mut filler);
        hasher.dummy_hash = hasher.hash(&String::from_utf8_lossy(&filler))?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt, returning a PHC string.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|_| PasswordError::Hash)?;

        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| PasswordError::Hash)
    }

    /// Check a password against a stored PHC string.
    ///
    /// The parameters embedded in the stored hash are used, so raising the
    /// configured cost does not lock out existing users.
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(stored_hash).map_err(|_| PasswordError::MalformedHash)?;
        Ok(self
            .argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Burn the same work as a real verification. Always returns false.
    pub fn verify_dummy(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.dummy_hash);
        false
    }

    /// [`Self::hash`] on the blocking thread pool.
    pub async fn hash_blocking(&self, password: String) -> Result<String, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|_| PasswordError::Join)?
    }

    /// [`Self::verify`] on the blocking thread pool. `None` runs a dummy check.
    pub async fn verify_blocking(
        &self,
        password: String,
        stored_hash: Option<String>,
    ) -> Result<bool, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => hasher.verify(&password, &hash),
            None => Ok(hasher.verify_dummy(&password)),
        })
        .await
        .map_err(|_| PasswordError::Join)?
    }
}

/// Errors from password hashing.
#[derive(Debug)]
pub enum PasswordError {
    /// Invalid Argon2 cost parameters
    Params,
    /// Hashing failed
    Hash,
    /// Stored hash is not a valid PHC string
    MalformedHash,
    /// Blocking task panicked or was cancelled
    Join,
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::Params => write!(f, "Invalid password hashing parameters"),
            PasswordError::Hash => write!(f, "Failed to hash password"),
            PasswordError::MalformedHash => write!(f, "Stored password hash is malformed"),
            PasswordError::Join => write!(f, "Password hashing task failed"),
        }
    }
}

impl std::error::Error for PasswordError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hasher() -> PasswordHasher {
        PasswordHasher::new(8, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = test_hasher();
        let hash = hasher.hash("Passw0rd!").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("Passw0rd!", &hash).unwrap());
        assert!(!hasher.verify("wrong", &hash).unwrap());
    }

    #[test]
    fn test_salt_is_random() {
        let hasher = test_hasher();
        let a = hasher.hash("Passw0rd!").unwrap();
        let b = hasher.hash("Passw0rd!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_uses_stored_params() {
        let strong = PasswordHasher::new(16, 2).unwrap();
        let weak = test_hasher();

        let hash = strong.hash("Passw0rd!").unwrap();
        assert!(weak.verify("Passw0rd!", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash() {
        let hasher = test_hasher();
        assert!(matches!(
            hasher.verify("x", "not-a-hash"),
            Err(PasswordError::MalformedHash)
        ));
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(
            PasswordHasher::new(1, 0),
            Err(PasswordError::Params)
        ));
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let hasher = test_hasher();
        let hash = hasher.hash_blocking("Passw0rd!".to_string()).await.unwrap();

        assert!(
            hasher
                .verify_blocking("Passw0rd!".to_string(), Some(hash))
                .await
                .unwrap()
        );
        assert!(
            !hasher
                .verify_blocking("Passw0rd!".to_string(), None)
                .await
                .unwrap()
        );
    }
}
