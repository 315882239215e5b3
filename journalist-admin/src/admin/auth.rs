//! Admin sessions.
//!
//! Sessions are identified by a random cookie value and stored in the
//! database with an expiry; credentials themselves are checked by
//! `AccountStore::authenticate`.

use crate::db::DbPool;
use crate::sql;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use sqlx::Row;

/// Admin session record
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub session_id: String,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Database-backed storage for admin sessions.
pub struct SessionStore {
    pool: DbPool,
}

impl SessionStore {
    /// Create a new SessionStore using the given database pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Generate a cryptographically secure session ID.
    fn generate_session_id() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect()
    }

    /// Create a session for an authenticated account and return its ID.
    pub async fn create_session(
        &self,
        account_id: i64,
        session_timeout_secs: u64,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<String> {
        let session_id = Self::generate_session_id();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(session_timeout_secs as i64);

        sqlx::query(sql::INSERT_ADMIN_SESSION)
            .bind(&session_id)
            .bind(account_id)
            .bind(now.to_rfc3339())
            .bind(expires_at.to_rfc3339())
            .bind(&ip_address)
            .bind(&user_agent)
            .execute(&self.pool)
            .await
            .context("Failed to create session")?;

        Ok(session_id)
    }

    /// Validate a session, deleting it if it has expired.
    pub async fn validate_session(&self, session_id: &str) -> Result<Option<AdminSession>> {
        let row = sqlx::query(sql::SELECT_ADMIN_SESSION)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query session")?;

        let session = match row {
            Some(row) => {
                let expires_at = DateTime::parse_from_rfc3339(row.get("expires_at"))
                    .context("Invalid expires_at timestamp")?
                    .with_timezone(&Utc);

                if expires_at < Utc::now() {
                    self.delete_session(session_id).await.ok();
                    return Ok(None);
                }

                Some(AdminSession {
                    session_id: row.get("session_id"),
                    account_id: row.get("account_id"),
                    created_at: DateTime::parse_from_rfc3339(row.get("created_at"))
                        .context("Invalid created_at timestamp")?
                        .with_timezone(&Utc),
                    expires_at,
                    ip_address: row.get("ip_address"),
                    user_agent: row.get("user_agent"),
                })
            }
            None => None,
        };

        Ok(session)
    }

    /// Delete a session (logout).
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        sqlx::query(sql::DELETE_ADMIN_SESSION)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Delete all expired sessions (background cleanup task).
    pub async fn cleanup_expired_sessions(&self) -> Result<u64> {
        let result = sqlx::query(sql::DELETE_EXPIRED_ADMIN_SESSIONS)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to delete expired sessions")?;

        Ok(result.rows_affected())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::account::{AccountStore, NewAccount};
    use crate::config::DatabaseConfig;
    use crate::db::Database;
    use crate::passwords::PasswordPolicy;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SessionStore, i64) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&DatabaseConfig::default(), temp.path())
            .await
            .unwrap();
        let accounts = AccountStore::new(db.pool(), PasswordPolicy::default());
        let account = accounts
            .create(NewAccount {
                username: "admin".to_string(),
                password: "amber bison cedar delta ember flint grain".to_string(),
                is_admin: true,
                hotp_secret: None,
            })
            .await
            .unwrap();
        (temp, SessionStore::new(db.pool()), account.id)
    }

    #[test]
    fn test_session_ids_are_random() {
        let a = SessionStore::generate_session_id();
        let b = SessionStore::generate_session_id();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (_temp, store, account_id) = setup().await;

        let session_id = store
            .create_session(account_id, 3600, Some("127.0.0.1".into()), None)
            .await
            .unwrap();
        let session = store.validate_session(&session_id).await.unwrap().unwrap();
        assert_eq!(session.account_id, account_id);
        assert_eq!(session.ip_address.as_deref(), Some("127.0.0.1"));

        store.delete_session(&session_id).await.unwrap();
        assert!(store.validate_session(&session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let (_temp, store, account_id) = setup().await;

        let session_id = store.create_session(account_id, 0, None, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(store.validate_session(&session_id).await.unwrap().is_none());
        assert!(store.validate_session("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (_temp, store, account_id) = setup().await;

        store.create_session(account_id, 0, None, None).await.unwrap();
        let live = store.create_session(account_id, 3600, None, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(store.cleanup_expired_sessions().await.unwrap(), 1);
        assert!(store.validate_session(&live).await.unwrap().is_some());
    }
}
