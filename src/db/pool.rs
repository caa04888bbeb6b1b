//! SQLite connection pool with WAL mode.
//!
//! The replica has a single writer (the sync run) and any number of readers,
//! which is exactly what WAL journaling is good at.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

/// Type alias for the SQLite connection pool.
pub type DbPool = Pool<Sqlite>;

/// Tunables for the connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Maximum open connections.
    pub max_connections: u32,

    /// How long a connection waits on a locked database, in seconds.
    pub busy_timeout_secs: u64,

    /// How long to wait for a free connection, in seconds.
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout_secs: 30,
            acquire_timeout_secs: 10,
        }
    }
}

/// Create a new connection pool with default settings.
pub async fn create_pool(db_path: &Path) -> Result<DbPool, sqlx::Error> {
    create_pool_with(db_path, &PoolSettings::default()).await
}

/// Create a new connection pool with WAL mode and foreign keys enabled.
///
/// The database file is created if missing; its parent directory is not.
pub async fn create_pool_with(
    db_path: &Path,
    settings: &PoolSettings,
) -> Result<DbPool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::new()
        .filename(db_path)
        // Create the database file if it doesn't exist
        .create_if_missing(true)
        // Enable WAL mode so readers don't block the sync writer
        .journal_mode(SqliteJournalMode::Wal)
        // NORMAL synchronous mode balances safety and performance
        .synchronous(SqliteSynchronous::Normal)
        // group_issues cascades on group/issue deletion
        .foreign_keys(true)
        // Wait on a locked database instead of failing immediately
        .busy_timeout(Duration::from_secs(settings.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        // Keep at least one connection warm
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .connect_with(connect_options)
        .await?;

    log::debug!("[store] Opened SQLite pool at {}", db_path.display());

    Ok(pool)
}
