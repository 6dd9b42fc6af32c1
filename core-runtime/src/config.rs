//! # Core Configuration Module
//!
//! Provides configuration management for the sync engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the storage location, scheduler cadence, run limits and
//! logging settings. It enforces fail-fast validation so a misconfigured host
//! fails at startup rather than on the first scheduled run.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/mediahub/catalog.db")
//!     .schedule_poll_interval(Duration::from_secs(300))
//!     .sync_timeout(Duration::from_secs(1800))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // No storage location configured
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing database location");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Default interval between scheduler polls (5 minutes)
pub const DEFAULT_SCHEDULE_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default upper bound for a single sync run (30 minutes)
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default size of the SQLite connection pool
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Where the catalog database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// SQLite file on disk
    File(PathBuf),
    /// Private in-memory database (tests, ephemeral hosts)
    InMemory,
}

/// Core configuration for the sync engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Catalog database location
    pub database: DatabaseLocation,

    /// Maximum pooled database connections
    pub max_connections: u32,

    /// Buffer size of the event bus
    pub event_buffer_size: usize,

    /// How often the background scheduler checks for due schedules
    pub schedule_poll_interval: Duration,

    /// Upper bound for one sync run; expiry fails the run
    pub sync_timeout: Duration,

    /// Run schedules for distinct sources concurrently
    pub parallel_source_sync: bool,

    /// Logging settings handed to [`init_logging`](crate::logging::init_logging)
    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Pool and event buffer sizes are non-zero
    /// - Poll interval and run timeout are non-zero
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.max_connections == 0 {
            return Err(Error::Config(
                "Connection pool must allow at least one connection".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.schedule_poll_interval.is_zero() {
            return Err(Error::Config(
                "Schedule poll interval must be greater than 0".to_string(),
            ));
        }

        if self.sync_timeout.is_zero() {
            return Err(Error::Config(
                "Sync timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) to validate and produce the
/// final config.
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database: Option<DatabaseLocation>,
    max_connections: Option<u32>,
    event_buffer_size: Option<usize>,
    schedule_poll_interval: Option<Duration>,
    sync_timeout: Option<Duration>,
    parallel_source_sync: bool,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Use a private in-memory database instead of a file.
    pub fn in_memory(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    /// Sets the connection pool size.
    ///
    /// Default: 5. Ignored for in-memory databases, which always use a single
    /// connection.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets the event bus buffer size.
    ///
    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`]
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets how often the scheduler polls for due schedules.
    ///
    /// Default: 5 minutes
    pub fn schedule_poll_interval(mut self, interval: Duration) -> Self {
        self.schedule_poll_interval = Some(interval);
        self
    }

    /// Sets the upper bound for a single sync run.
    ///
    /// Default: 30 minutes
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }

    /// Run schedules for distinct sources concurrently.
    ///
    /// Default: `false`
    pub fn parallel_source_sync(mut self, enabled: bool) -> Self {
        self.parallel_source_sync = enabled;
        self
    }

    /// Sets the logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - No database location was given
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database location is required. Use .database_path() or .in_memory() to set it."
                    .to_string(),
            )
        })?;

        let config = CoreConfig {
            database,
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            schedule_poll_interval: self
                .schedule_poll_interval
                .unwrap_or(DEFAULT_SCHEDULE_POLL_INTERVAL),
            sync_timeout: self.sync_timeout.unwrap_or(DEFAULT_SYNC_TIMEOUT),
            parallel_source_sync: self.parallel_source_sync,
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::builder()
            .database_path("/tmp/catalog.db")
            .build()
            .unwrap();

        assert_eq!(
            config.database,
            DatabaseLocation::File(PathBuf::from("/tmp/catalog.db"))
        );
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.schedule_poll_interval, DEFAULT_SCHEDULE_POLL_INTERVAL);
        assert_eq!(config.sync_timeout, DEFAULT_SYNC_TIMEOUT);
        assert!(!config.parallel_source_sync);
    }

    #[test]
    fn test_builder_overrides() {
        let config = CoreConfig::builder()
            .in_memory()
            .max_connections(2)
            .event_buffer_size(16)
            .schedule_poll_interval(Duration::from_secs(60))
            .sync_timeout(Duration::from_secs(90))
            .parallel_source_sync(true)
            .logging(LoggingConfig::default().with_format(LogFormat::Compact))
            .build()
            .unwrap();

        assert_eq!(config.database, DatabaseLocation::InMemory);
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.event_buffer_size, 16);
        assert_eq!(config.sync_timeout, Duration::from_secs(90));
        assert!(config.parallel_source_sync);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_missing_database_location() {
        let result = CoreConfig::builder().build();
        match result {
            Err(Error::Config(message)) => assert!(message.contains("database_path")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_database_path_rejected() {
        assert!(CoreConfig::builder().database_path("").build().is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(CoreConfig::builder()
            .in_memory()
            .sync_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(CoreConfig::builder()
            .in_memory()
            .schedule_poll_interval(Duration::ZERO)
            .build()
            .is_err());
        assert!(CoreConfig::builder()
            .in_memory()
            .event_buffer_size(0)
            .build()
            .is_err());
        assert!(CoreConfig::builder()
            .in_memory()
            .max_connections(0)
            .build()
            .is_err());
    }
}
