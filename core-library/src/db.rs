//! # Catalog Database
//!
//! SQLite pool for the canonical catalog, with the schema migrated on open.
//!
//! - File databases run in WAL mode so readers are not blocked while a sync
//!   batch is being written, and wait on `busy_timeout` instead of failing
//!   when sources are synced in parallel.
//! - Foreign keys are enforced; source mapping and playback rows cascade
//!   with their canonical item.
//! - `:memory:` databases are per connection, so in-memory pools hold
//!   exactly one connection that never expires.
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("catalog.db").max_connections(8)).await?;
//! let items = SqliteMediaItemRepository::new(pool.clone());
//! ```

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a writer waits for the database lock held by another sync
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the catalog lives and how many connections may reach it
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:<path>` or `sqlite::memory:`
    pub database_url: String,
    pub max_connections: u32,
    /// Maximum wait for a free connection
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// File-backed catalog, created when missing
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_url: format!("sqlite:{}", database_path.into().display()),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Private in-memory catalog, used by tests and throwaway hosts
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open the catalog and bring its schema up to date
///
/// # Errors
///
/// Returns an error if the database cannot be opened, a migration fails, or
/// the first query on the new pool fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Opening catalog database"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(LibraryError::Database)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true)
        .create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new().acquire_timeout(config.acquire_timeout);
    pool_options = if config.is_in_memory() {
        // Losing the only connection would drop the database with it
        pool_options
            .min_connections(1)
            .max_connections(1)
            .max_lifetime(None)
            .idle_timeout(None)
    } else {
        pool_options.max_connections(config.max_connections)
    };

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open catalog database");
            LibraryError::Database(e)
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Catalog migration failed");
            LibraryError::Migration(e.to_string())
        })?;
    debug!("Catalog schema is up to date");

    health_check(&pool).await?;
    Ok(pool)
}

/// Migrated in-memory catalog
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Catalog health check failed");
        LibraryError::Database(e)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_pool_shares_one_database() {
        let pool = create_test_pool().await.unwrap();

        sqlx::query("CREATE TABLE scratch (v INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO scratch (v) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();

        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scratch")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(result.0, 1);
        assert!(health_check(&pool).await.is_ok());
    }

    #[test]
    fn test_database_config() {
        let config = DatabaseConfig::in_memory().max_connections(8);
        assert!(config.is_in_memory());

        let file = DatabaseConfig::new("/var/lib/mediahub/catalog.db").max_connections(8);
        assert_eq!(file.database_url, "sqlite:/var/lib/mediahub/catalog.db");
        assert_eq!(file.max_connections, 8);
        assert!(!file.is_in_memory());
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let path = std::env::temp_dir().join(format!("mediahub-catalog-{}.db", std::process::id()));
        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = create_test_pool().await.unwrap();

        let result: (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = create_test_pool().await.unwrap();

        for table in [
            "media_items",
            "media_item_sources",
            "playback_records",
            "sync_schedules",
            "job_runs",
        ] {
            let result: (i32,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();

            assert_eq!(result.0, 1, "{} table should exist", table);
        }
    }
}
