//! Session-scoped flash messages.
//!
//! A flash is queued by one request and shown by the next page rendered for
//! the same session. Taking the flashes of a session removes them.

use crate::db::DbPool;
use crate::sql;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::Row;
use tracing::warn;

/// Flash category, used by templates for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashCategory {
    Error,
    Notification,
    Success,
    LogoSuccess,
    LogoError,
}

impl FlashCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashCategory::Error => "error",
            FlashCategory::Notification => "notification",
            FlashCategory::Success => "success",
            FlashCategory::LogoSuccess => "logo-success",
            FlashCategory::LogoError => "logo-error",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(FlashCategory::Error),
            "notification" => Some(FlashCategory::Notification),
            "success" => Some(FlashCategory::Success),
            "logo-success" => Some(FlashCategory::LogoSuccess),
            "logo-error" => Some(FlashCategory::LogoError),
            _ => None,
        }
    }
}

/// A queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub category: FlashCategory,
    pub message: String,
}

impl Flash {
    pub fn category(&self) -> &'static str {
        self.category.as_str()
    }
}

pub struct FlashStore {
    pool: DbPool,
}

impl FlashStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Queue a message for the session.
    pub async fn push(
        &self,
        session_id: &str,
        category: FlashCategory,
        message: impl Into<String>,
    ) -> Result<()> {
        sqlx::query(sql::INSERT_FLASH)
            .bind(session_id)
            .bind(category.as_str())
            .bind(message.into())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to store flash message")?;
        Ok(())
    }

    /// Remove and return all queued messages for the session, oldest first.
    pub async fn take(&self, session_id: &str) -> Result<Vec<Flash>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(sql::SELECT_FLASHES)
            .bind(session_id)
            .fetch_all(&mut *tx)
            .await
            .context("Failed to load flash messages")?;

        sqlx::query(sql::DELETE_FLASHES)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear flash messages")?;

        tx.commit().await?;

        let flashes = rows
            .into_iter()
            .filter_map(|row| {
                let category: String = row.get("category");
                let Some(category) = FlashCategory::parse(&category) else {
                    warn!(category = %category, "Dropping flash with unknown category");
                    return None;
                };
                Some(Flash {
                    category,
                    message: row.get("message"),
                })
            })
            .collect();

        Ok(flashes)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::account::{AccountStore, NewAccount};
    use crate::admin::auth::SessionStore;
    use crate::config::DatabaseConfig;
    use crate::db::Database;
    use crate::passwords::PasswordPolicy;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_flashes_are_read_once_in_order() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&DatabaseConfig::default(), temp.path())
            .await
            .unwrap();
        let account = AccountStore::new(db.pool(), PasswordPolicy::default())
            .create(NewAccount {
                username: "admin".to_string(),
                password: "amber bison cedar delta ember flint grain".to_string(),
                is_admin: true,
                hotp_secret: None,
            })
            .await
            .unwrap();
        let session_id = SessionStore::new(db.pool())
            .create_session(account.id, 3600, None, None)
            .await
            .unwrap();

        let flashes = FlashStore::new(db.pool());
        flashes
            .push(&session_id, FlashCategory::Error, "first")
            .await
            .unwrap();
        flashes
            .push(&session_id, FlashCategory::LogoSuccess, "second")
            .await
            .unwrap();

        let taken = flashes.take(&session_id).await.unwrap();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].message, "first");
        assert_eq!(taken[1].category(), "logo-success");

        assert!(flashes.take(&session_id).await.unwrap().is_empty());
    }
}
