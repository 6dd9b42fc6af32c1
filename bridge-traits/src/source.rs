//! Media Source Abstractions
//!
//! Capability traits implemented by each client adapter (Jellyfin, Plex,
//! Subsonic, the *arr family, ...).
//!
//! ## Overview
//!
//! A connected adapter is a [`MediaSource`]. It answers capability probes
//! (`supports_movies()`, `supports_history()`, ...) and hands out typed
//! sub-interfaces ([`MovieSource`], [`SeriesSource`], [`MusicSource`],
//! [`HistorySource`]) for the capabilities it implements. The sync engine
//! checks both before fetching anything: a probe that says "yes" with no
//! matching interface is treated as a capability mismatch.
//!
//! Every record an adapter returns carries the mapping for the source it
//! came from (`CanonicalMediaItem::sources` / `PlaybackRecord::source`).
//! Source item IDs must be unique within one source; adapters whose backend
//! reuses IDs across kinds prefix them (`"movie:42"`).
//!
//! [`SourceFactory`] builds adapters. The sync orchestrator asks each
//! registered factory whether it has a configuration for a source ID and
//! connects through the first one that does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_library::models::{CanonicalMediaItem, PlaybackRecord, SourceId, SourceType, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// Paging and filter options accepted by bulk listings
///
/// The sync engine always requests full listings (`QueryOptions::default()`);
/// adapters may use the fields when called from elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Only return records changed after this instant
    pub since: Option<DateTime<Utc>>,
    /// Restrict to a single user (history)
    pub user_id: Option<UserId>,
}

/// Connection settings for one configured source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: SourceId,
    pub source_type: SourceType,
    pub display_name: String,
    pub base_url: Option<String>,
}

/// Movie listings
#[async_trait]
pub trait MovieSource: Send + Sync {
    /// Full movie listing
    async fn get_movies(&self, options: &QueryOptions) -> Result<Vec<CanonicalMediaItem>>;

    /// Fetch a single movie by its source item ID
    ///
    /// Returns `Ok(None)` when the source has no such movie.
    async fn get_movie_by_id(&self, source_item_id: &str) -> Result<Option<CanonicalMediaItem>>;
}

/// Series, season and episode listings
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Full series listing
    async fn get_series(&self, options: &QueryOptions) -> Result<Vec<CanonicalMediaItem>>;

    /// Fetch a single series by its source item ID
    async fn get_series_by_id(&self, source_item_id: &str) -> Result<Option<CanonicalMediaItem>>;

    /// Seasons of one series
    async fn get_series_seasons(&self, series_item_id: &str) -> Result<Vec<CanonicalMediaItem>>;

    /// Episodes of one season
    async fn get_series_episodes(
        &self,
        series_item_id: &str,
        season_item_id: &str,
    ) -> Result<Vec<CanonicalMediaItem>>;
}

/// Music listings
#[async_trait]
pub trait MusicSource: Send + Sync {
    async fn get_music_tracks(&self, options: &QueryOptions) -> Result<Vec<CanonicalMediaItem>>;

    async fn get_music_albums(&self, options: &QueryOptions) -> Result<Vec<CanonicalMediaItem>>;

    async fn get_music_artists(&self, options: &QueryOptions) -> Result<Vec<CanonicalMediaItem>>;

    /// Fetch a single track by its source item ID
    async fn get_track_by_id(&self, source_item_id: &str) -> Result<Option<CanonicalMediaItem>>;
}

/// Per-user playback history
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Playback events observed by the source
    ///
    /// Each record carries the source mapping of the item it refers to in
    /// `PlaybackRecord::source`; `user_id` and `media_item_id` are assigned
    /// by the sync engine.
    async fn get_play_history(&self, options: &QueryOptions) -> Result<Vec<PlaybackRecord>>;
}

/// A connected client adapter
///
/// Capability probes default to `false` and sub-interfaces to `None`, so an
/// adapter only overrides what it implements.
pub trait MediaSource: Send + Sync {
    /// ID of the configured source this adapter talks to
    fn source_id(&self) -> SourceId;

    /// Client family of the source
    fn source_type(&self) -> SourceType;

    fn supports_movies(&self) -> bool {
        false
    }

    fn supports_series(&self) -> bool {
        false
    }

    fn supports_music(&self) -> bool {
        false
    }

    fn supports_history(&self) -> bool {
        false
    }

    fn movies(&self) -> Option<&dyn MovieSource> {
        None
    }

    fn series(&self) -> Option<&dyn SeriesSource> {
        None
    }

    fn music(&self) -> Option<&dyn MusicSource> {
        None
    }

    fn history(&self) -> Option<&dyn HistorySource> {
        None
    }
}

/// Builds adapters for one client family
#[async_trait]
pub trait SourceFactory: Send + Sync {
    /// Client family this factory connects to
    fn source_type(&self) -> SourceType;

    /// Look up the stored configuration for a source
    ///
    /// Returns `Ok(None)` when this factory does not know the source.
    async fn load_config(&self, source_id: SourceId) -> Result<Option<SourceConfig>>;

    /// Connect an adapter for a configuration previously returned by
    /// [`load_config`](Self::load_config)
    async fn connect(&self, config: SourceConfig) -> Result<Arc<dyn MediaSource>>;
}
