//! Shared fixtures for sync integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::source::{
    HistorySource, MediaSource, MovieSource, MusicSource, QueryOptions, SeriesSource,
    SourceConfig, SourceFactory,
};
use bridge_traits::time::FixedClock;
use chrono::{DateTime, TimeZone, Utc};
use core_library::create_test_pool;
use core_library::models::{
    CanonicalMediaItem, EpisodeDetails, MediaKind, MediaPayload, MovieDetails, PlaybackRecord,
    SeasonDetails, SeriesDetails, SourceId, SourceMapping, SourceType, TrackDetails, UserId,
};
use core_runtime::events::EventBus;
use core_sync::{AdapterRegistry, SyncConfig, SyncOrchestrator, SyncRepositories};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fake Source
// ============================================================================

/// In-memory source adapter
///
/// A listing set to `None` means the matching interface is not exposed.
pub struct FakeSource {
    pub source_id: SourceId,
    pub source_type: SourceType,
    pub movies: Option<Vec<CanonicalMediaItem>>,
    pub series: Option<Vec<CanonicalMediaItem>>,
    /// Seasons by series item ID
    pub seasons: HashMap<String, Vec<CanonicalMediaItem>>,
    /// Episodes by (series item ID, season item ID)
    pub episodes: HashMap<(String, String), Vec<CanonicalMediaItem>>,
    pub tracks: Option<Vec<CanonicalMediaItem>>,
    pub history: Option<Vec<PlaybackRecord>>,
    /// Whether `supports_history()` is declared
    pub declares_history: bool,
    /// Delay applied to every listing call
    pub delay: Option<Duration>,
    /// Delay applied to single-movie lookups
    pub lookup_delay: Option<Duration>,
    /// Number of listing calls served
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(source_id: SourceId, source_type: SourceType) -> Self {
        Self {
            source_id,
            source_type,
            movies: None,
            series: None,
            seasons: HashMap::new(),
            episodes: HashMap::new(),
            tracks: None,
            history: None,
            declares_history: false,
            delay: None,
            lookup_delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_movies(mut self, movies: Vec<CanonicalMediaItem>) -> Self {
        self.movies = Some(movies);
        self
    }

    pub fn with_series(mut self, series: Vec<CanonicalMediaItem>) -> Self {
        self.series = Some(series);
        self
    }

    pub fn with_seasons(mut self, series_item_id: &str, seasons: Vec<CanonicalMediaItem>) -> Self {
        self.seasons.insert(series_item_id.to_string(), seasons);
        self
    }

    pub fn with_episodes(
        mut self,
        series_item_id: &str,
        season_item_id: &str,
        episodes: Vec<CanonicalMediaItem>,
    ) -> Self {
        self.episodes.insert(
            (series_item_id.to_string(), season_item_id.to_string()),
            episodes,
        );
        self
    }

    pub fn with_tracks(mut self, tracks: Vec<CanonicalMediaItem>) -> Self {
        self.tracks = Some(tracks);
        self
    }

    pub fn with_history(mut self, history: Vec<PlaybackRecord>, declared: bool) -> Self {
        self.history = Some(history);
        self.declares_history = declared;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn serve<T: Clone>(&self, listing: &Option<Vec<T>>) -> BridgeResult<Vec<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        listing
            .clone()
            .ok_or_else(|| BridgeError::NotAvailable("listing not configured".to_string()))
    }
}

#[async_trait]
impl MovieSource for FakeSource {
    async fn get_movies(&self, _options: &QueryOptions) -> BridgeResult<Vec<CanonicalMediaItem>> {
        self.serve(&self.movies).await
    }

    async fn get_movie_by_id(&self, source_item_id: &str) -> BridgeResult<Option<CanonicalMediaItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.movies.as_ref().and_then(|movies| {
            movies
                .iter()
                .find(|m| {
                    m.sources
                        .get(self.source_id)
                        .is_some_and(|s| s.source_item_id == source_item_id)
                })
                .cloned()
        }))
    }
}

#[async_trait]
impl SeriesSource for FakeSource {
    async fn get_series(&self, _options: &QueryOptions) -> BridgeResult<Vec<CanonicalMediaItem>> {
        self.serve(&self.series).await
    }

    async fn get_series_by_id(&self, source_item_id: &str) -> BridgeResult<Option<CanonicalMediaItem>> {
        Ok(self.series.as_ref().and_then(|series| {
            series
                .iter()
                .find(|s| {
                    s.sources
                        .get(self.source_id)
                        .is_some_and(|m| m.source_item_id == source_item_id)
                })
                .cloned()
        }))
    }

    async fn get_series_seasons(&self, series_item_id: &str) -> BridgeResult<Vec<CanonicalMediaItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seasons
            .get(series_item_id)
            .cloned()
            .ok_or_else(|| BridgeError::ItemNotFound(series_item_id.to_string()))
    }

    async fn get_series_episodes(
        &self,
        series_item_id: &str,
        season_item_id: &str,
    ) -> BridgeResult<Vec<CanonicalMediaItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .episodes
            .get(&(series_item_id.to_string(), season_item_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl MusicSource for FakeSource {
    async fn get_music_tracks(&self, _options: &QueryOptions) -> BridgeResult<Vec<CanonicalMediaItem>> {
        self.serve(&self.tracks).await
    }

    async fn get_music_albums(&self, _options: &QueryOptions) -> BridgeResult<Vec<CanonicalMediaItem>> {
        Ok(Vec::new())
    }

    async fn get_music_artists(&self, _options: &QueryOptions) -> BridgeResult<Vec<CanonicalMediaItem>> {
        Ok(Vec::new())
    }

    async fn get_track_by_id(&self, _source_item_id: &str) -> BridgeResult<Option<CanonicalMediaItem>> {
        Ok(None)
    }
}

#[async_trait]
impl HistorySource for FakeSource {
    async fn get_play_history(&self, _options: &QueryOptions) -> BridgeResult<Vec<PlaybackRecord>> {
        self.serve(&self.history).await
    }
}

impl MediaSource for FakeSource {
    fn source_id(&self) -> SourceId {
        self.source_id
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn supports_movies(&self) -> bool {
        self.movies.is_some()
    }

    fn supports_series(&self) -> bool {
        self.series.is_some()
    }

    fn supports_music(&self) -> bool {
        self.tracks.is_some()
    }

    fn supports_history(&self) -> bool {
        self.declares_history
    }

    fn movies(&self) -> Option<&dyn MovieSource> {
        self.movies.is_some().then_some(self as &dyn MovieSource)
    }

    fn series(&self) -> Option<&dyn SeriesSource> {
        self.series.is_some().then_some(self as &dyn SeriesSource)
    }

    fn music(&self) -> Option<&dyn MusicSource> {
        self.tracks.is_some().then_some(self as &dyn MusicSource)
    }

    fn history(&self) -> Option<&dyn HistorySource> {
        self.history.is_some().then_some(self as &dyn HistorySource)
    }
}

// ============================================================================
// Fake Factory
// ============================================================================

/// Factory serving a fixed set of fake sources
pub struct FakeFactory {
    source_type: SourceType,
    sources: HashMap<SourceId, Arc<FakeSource>>,
    offline: bool,
}

impl FakeFactory {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            sources: HashMap::new(),
            offline: false,
        }
    }

    /// Every config lookup fails
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn with_source(mut self, source: Arc<FakeSource>) -> Self {
        self.sources.insert(source.source_id, source);
        self
    }
}

#[async_trait]
impl SourceFactory for FakeFactory {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    async fn load_config(&self, source_id: SourceId) -> BridgeResult<Option<SourceConfig>> {
        if self.offline {
            return Err(BridgeError::OperationFailed(format!(
                "{} config store offline",
                self.source_type
            )));
        }
        Ok(self.sources.contains_key(&source_id).then(|| SourceConfig {
            source_id,
            source_type: self.source_type,
            display_name: format!("{} #{}", self.source_type, source_id),
            base_url: None,
        }))
    }

    async fn connect(&self, config: SourceConfig) -> BridgeResult<Arc<dyn MediaSource>> {
        self.sources
            .get(&config.source_id)
            .cloned()
            .map(|source| source as Arc<dyn MediaSource>)
            .ok_or_else(|| BridgeError::InvalidConfig(format!("unknown source {}", config.source_id)))
    }
}

/// Registry with one factory serving `source`
pub fn registry_for(source: Arc<FakeSource>) -> AdapterRegistry {
    let source_type = source.source_type;
    AdapterRegistry::new().register(Arc::new(FakeFactory::new(source_type).with_source(source)))
}

// ============================================================================
// Harness
// ============================================================================

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap()
}

pub struct Harness {
    pub orchestrator: SyncOrchestrator,
    pub repositories: SyncRepositories,
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub clock: Arc<FixedClock>,
}

pub async fn harness(registry: AdapterRegistry) -> Harness {
    harness_with(registry, SyncConfig::default(), |repos| repos).await
}

/// Build a harness, letting the caller wrap the SQLite repositories
pub async fn harness_with(
    registry: AdapterRegistry,
    config: SyncConfig,
    wrap: impl FnOnce(SyncRepositories) -> SyncRepositories,
) -> Harness {
    let pool = create_test_pool().await.unwrap();
    let sqlite = SyncRepositories::sqlite(pool.clone());
    let repositories = wrap(sqlite.clone());
    let event_bus = EventBus::new(256);
    let clock = Arc::new(FixedClock::new(t0()));

    let orchestrator = SyncOrchestrator::with_parts(
        config,
        registry,
        repositories,
        Some(event_bus.clone()),
        clock.clone(),
    );

    Harness {
        orchestrator,
        repositories: sqlite,
        pool,
        event_bus,
        clock,
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn movie(source: SourceId, item_id: &str, title: &str, year: i32) -> CanonicalMediaItem {
    CanonicalMediaItem::new(MediaPayload::Movie(MovieDetails {
        title: title.to_string(),
        year: Some(year),
        ..Default::default()
    }))
    .with_source(SourceMapping::new(source, SourceType::Jellyfin, item_id))
}

pub fn series(source: SourceId, item_id: &str, title: &str, genres: &[&str]) -> CanonicalMediaItem {
    CanonicalMediaItem::new(MediaPayload::Series(SeriesDetails {
        title: title.to_string(),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        ..Default::default()
    }))
    .with_source(SourceMapping::new(source, SourceType::Jellyfin, item_id))
}

pub fn season(source: SourceId, item_id: &str, number: u32, episodes: Option<u32>) -> CanonicalMediaItem {
    CanonicalMediaItem::new(MediaPayload::Season(SeasonDetails {
        title: format!("Season {}", number),
        season_number: number,
        episode_count: episodes,
        ..Default::default()
    }))
    .with_source(SourceMapping::new(source, SourceType::Jellyfin, item_id))
}

pub fn episode(source: SourceId, item_id: &str, title: &str, season: u32, number: u32) -> CanonicalMediaItem {
    CanonicalMediaItem::new(MediaPayload::Episode(EpisodeDetails {
        title: title.to_string(),
        season_number: season,
        episode_number: number,
        ..Default::default()
    }))
    .with_source(SourceMapping::new(source, SourceType::Jellyfin, item_id))
}

pub fn track(source: SourceId, item_id: &str, title: &str) -> CanonicalMediaItem {
    CanonicalMediaItem::new(MediaPayload::Track(TrackDetails {
        title: title.to_string(),
        ..Default::default()
    }))
    .with_source(SourceMapping::new(source, SourceType::Jellyfin, item_id))
}

pub fn play(
    source: SourceId,
    kind: MediaKind,
    item_id: &str,
    percentage: f64,
    played_at: DateTime<Utc>,
) -> PlaybackRecord {
    let mut record = PlaybackRecord::new(UserId(0), kind);
    record.source = Some(SourceMapping::new(source, SourceType::Jellyfin, item_id));
    record.play_count = 1;
    record.played_percentage = percentage;
    record.position_secs = (percentage * 60.0) as u64;
    record.duration_secs = 6000;
    record.first_played_at = Some(played_at);
    record.last_played_at = Some(played_at);
    record
}
