//! Credential store: user identity records and password checks.

use tracing::info;

use crate::db::{Database, NewUser, User, is_unique_violation};
use crate::password::{PasswordError, PasswordHasher};

/// Signup input after validation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Errors from the credential store.
#[derive(Debug)]
pub enum CredentialError {
    /// Username or email already in use. Deliberately does not say which.
    Conflict,
    /// No user matches the login identifier.
    NotFound,
    /// Unknown identifier or wrong password; callers cannot tell which.
    InvalidCredentials,
    Database(sqlx::Error),
    Password(PasswordError),
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::Conflict => write!(f, "Username or email already in use"),
            CredentialError::NotFound => write!(f, "User not found"),
            CredentialError::InvalidCredentials => write!(f, "Invalid credentials"),
            CredentialError::Database(e) => write!(f, "Database error: {}", e),
            CredentialError::Password(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CredentialError {}

impl From<sqlx::Error> for CredentialError {
    fn from(e: sqlx::Error) -> Self {
        CredentialError::Database(e)
    }
}

impl From<PasswordError> for CredentialError {
    fn from(e: PasswordError) -> Self {
        CredentialError::Password(e)
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    db: Database,
    hasher: PasswordHasher,
}

impl CredentialStore {
    pub fn new(db: Database, hasher: PasswordHasher) -> Self {
        Self { db, hasher }
    }

    /// Create a user. Returns the new user's internal ID.
    pub async fn create(&self, account: NewAccount) -> Result<i64, CredentialError> {
        let users = self.db.users();

        if users
            .is_identity_taken(&account.username, &account.email)
            .await?
        {
            return Err(CredentialError::Conflict);
        }

        let password_hash = self.hasher.hash_blocking(account.password).await?;
        let uuid = uuid::Uuid::new_v4().to_string();

        // Another signup may have raced us between the check and the insert.
        let id = users
            .create(&NewUser {
                uuid: &uuid,
                username: &account.username,
                email: &account.email,
                password_hash: &password_hash,
                first_name: &account.first_name,
                last_name: &account.last_name,
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CredentialError::Conflict
                } else {
                    CredentialError::Database(e)
                }
            })?;

        info!(user_id = id, "User created");
        Ok(id)
    }

    /// Find a user by username or email.
    pub async fn find_by_login_identifier(&self, identifier: &str) -> Result<User, CredentialError> {
        self.db
            .users()
            .get_by_login(identifier)
            .await?
            .ok_or(CredentialError::NotFound)
    }

    /// Check a login identifier and password.
    ///
    /// Unknown identifiers still pay for a hash verification.
    pub async fn verify(&self, identifier: &str, password: &str) -> Result<User, CredentialError> {
        let user = match self.find_by_login_identifier(identifier).await {
            Ok(user) => Some(user),
            Err(CredentialError::NotFound) => None,
            Err(e) => return Err(e),
        };

        let matches = self
            .hasher
            .verify_blocking(
                password.to_string(),
                user.as_ref().map(|u| u.password_hash.clone()),
            )
            .await?;

        match user {
            Some(user) if matches => Ok(user),
            _ => Err(CredentialError::InvalidCredentials),
        }
    }
}
