//! Database management for the admin interface.
//!
//! Provides the shared connection pool used by the account, session and
//! flash stores.
//!
//! The database backend is selected at compile time via feature flags:
//! - `sqlite` (default): Uses SQLite
//! - `postgres`: Uses PostgreSQL

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use std::path::Path;
use std::time::Duration;
use tracing::info;

// Re-export the pool and row types for the selected backend
#[cfg(feature = "sqlite")]
pub use sqlx::{SqlitePool as DbPool, sqlite::SqliteRow as DbRow};

#[cfg(feature = "postgres")]
pub use sqlx::{PgPool as DbPool, postgres::PgRow as DbRow};

#[cfg(feature = "sqlite")]
static MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");

#[cfg(feature = "postgres")]
static MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");

/// How long a statement waits on a locked database before failing.
///
/// Token claims and session writes from concurrent requests queue on this
/// instead of surfacing as errors.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared database for the admin interface.
///
/// Owns the connection pool and runs migrations. Created once at startup.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Connect to the configured backend and bring the schema up to date.
    pub async fn new(config: &DatabaseConfig, data_dir: &Path) -> Result<Self> {
        let pool = connect(config, data_dir).await?;
        MIGRATOR
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        Ok(Self { pool })
    }

    /// Get a clone of the connection pool (internally Arc-based).
    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }
}

/// Open the journalist database file, creating it on first start.
///
/// Foreign keys are enforced so that deleting an account cascades to its
/// sessions and their flashes.
#[cfg(feature = "sqlite")]
async fn connect(config: &DatabaseConfig, data_dir: &Path) -> Result<DbPool> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

    let db_path = config
        .path
        .clone()
        .unwrap_or_else(|| data_dir.join("journalists.db"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(LOCK_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open journalist database {}", db_path.display()))?;

    info!(backend = "sqlite", path = %db_path.display(), "Database connected");
    Ok(pool)
}

#[cfg(feature = "postgres")]
async fn connect(config: &DatabaseConfig, _data_dir: &Path) -> Result<DbPool> {
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(LOCK_TIMEOUT)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to PostgreSQL at {}", config.host))?;

    info!(backend = "postgres", host = %config.host, database = %config.database, "Database connected");
    Ok(pool)
}
