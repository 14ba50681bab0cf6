//! Refresh credential storage.
//!
//! Only refresh secrets are stored for revocation support.
//! Access tokens are stateless and short-lived (30 minutes).

use sqlx::sqlite::SqlitePool;

/// An active refresh credential.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub secret: String,
    pub user_id: i64,
    pub last_ip: Option<String>,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
    pub created_at: String,
}

impl Session {
    /// Whether the session has expired at the given unix time.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at < now as i64
    }
}

/// Store for managing refresh credentials.
pub struct SessionStore {
    pool: SqlitePool,
}

const SESSION_COLUMNS: &str = "id, secret, user_id, last_ip, expires_at, created_at";

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a session row. Fails (never overwrites) if the secret already exists.
    pub async fn create(
        &self,
        secret: &str,
        user_id: i64,
        ip: Option<&str>,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO sessions (secret, user_id, last_ip, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(secret)
        .bind(user_id)
        .bind(ip)
        .bind(expires_at as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a session by its secret.
    pub async fn get_by_secret(&self, secret: &str) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE secret = ?",
            SESSION_COLUMNS
        ))
        .bind(secret)
        .fetch_optional(&self.pool)
        .await
    }

    /// Update the last IP address seen for a session.
    pub async fn update_ip(&self, secret: &str, ip: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET last_ip = ? WHERE secret = ?")
            .bind(ip)
            .bind(secret)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace `old_secret` with `new_secret` atomically.
    ///
    /// Returns false if the old secret was already gone (revoked or rotated by a
    /// concurrent request), in which case nothing is inserted.
    pub async fn replace(
        &self,
        old_secret: &str,
        new_secret: &str,
        expires_at: u64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let old: Option<(i64, Option<String>)> =
            sqlx::query_as("SELECT user_id, last_ip FROM sessions WHERE secret = ?")
                .bind(old_secret)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((user_id, last_ip)) = old else {
            return Ok(false);
        };

        let deleted = sqlx::query("DELETE FROM sessions WHERE secret = ?")
            .bind(old_secret)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO sessions (secret, user_id, last_ip, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(new_secret)
        .bind(user_id)
        .bind(last_ip)
        .bind(expires_at as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Delete a session by its secret (revoke).
    pub async fn delete_by_secret(&self, secret: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE secret = ?")
            .bind(secret)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all sessions that expired before `now` (unix seconds).
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List all unexpired sessions for a user, newest first.
    pub async fn list_by_user(&self, user_id: i64, now: u64) -> Result<Vec<Session>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE user_id = ? AND expires_at >= ? ORDER BY id DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(now as i64)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete all sessions for a user (logout everywhere).
    pub async fn delete_all_by_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
