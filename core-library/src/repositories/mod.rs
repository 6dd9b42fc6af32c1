//! # Repository Pattern Implementation
//!
//! This module provides repository traits and implementations for data access
//! to the canonical catalog.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `MediaItemRepository` - Canonical media items with their source mappings
//! - `PlaybackRepository` - Per-user playback records

pub mod media_item;
pub mod playback;

pub use media_item::{MediaItemRepository, SqliteMediaItemRepository};
pub use playback::{PlaybackRepository, SqlitePlaybackRepository};

use chrono::{DateTime, Utc};

/// Convert a stored Unix timestamp (seconds) back into a UTC datetime
pub(crate) fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
