//! Domain models for the canonical media catalog
//!
//! This module contains the canonical media model, the identity collections
//! that bind a canonical item to its copies in external sources, and the
//! per-user playback record.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LibraryError;

// =============================================================================
// ID Types
// =============================================================================

/// Internal identifier of a canonical media item
///
/// Assigned by the store on first insert and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct MediaItemId(pub i64);

impl fmt::Display for MediaItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a configured external source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct SourceId(pub i64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Source Types
// =============================================================================

/// Kind of external media server or automation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Jellyfin,
    Emby,
    Plex,
    Subsonic,
    Radarr,
    Sonarr,
    Lidarr,
}

impl SourceType {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Jellyfin => "jellyfin",
            SourceType::Emby => "emby",
            SourceType::Plex => "plex",
            SourceType::Subsonic => "subsonic",
            SourceType::Radarr => "radarr",
            SourceType::Sonarr => "sonarr",
            SourceType::Lidarr => "lidarr",
        }
    }
}

impl FromStr for SourceType {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jellyfin" => Ok(SourceType::Jellyfin),
            "emby" => Ok(SourceType::Emby),
            "plex" => Ok(SourceType::Plex),
            "subsonic" => Ok(SourceType::Subsonic),
            "radarr" => Ok(SourceType::Radarr),
            "sonarr" => Ok(SourceType::Sonarr),
            "lidarr" => Ok(SourceType::Lidarr),
            other => Err(LibraryError::InvalidInput {
                field: "source_type".to_string(),
                message: format!("unknown source type '{}'", other),
            }),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Media Kinds & Payloads
// =============================================================================

/// Discriminant of a canonical media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Series,
    Season,
    Episode,
    Track,
    Album,
    Artist,
    Playlist,
    Collection,
}

impl MediaKind {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Series => "series",
            MediaKind::Season => "season",
            MediaKind::Episode => "episode",
            MediaKind::Track => "track",
            MediaKind::Album => "album",
            MediaKind::Artist => "artist",
            MediaKind::Playlist => "playlist",
            MediaKind::Collection => "collection",
        }
    }
}

impl FromStr for MediaKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaKind::Movie),
            "series" => Ok(MediaKind::Series),
            "season" => Ok(MediaKind::Season),
            "episode" => Ok(MediaKind::Episode),
            "track" => Ok(MediaKind::Track),
            "album" => Ok(MediaKind::Album),
            "artist" => Ok(MediaKind::Artist),
            "playlist" => Ok(MediaKind::Playlist),
            "collection" => Ok(MediaKind::Collection),
            other => Err(LibraryError::InvalidInput {
                field: "kind".to_string(),
                message: format!("unknown media kind '{}'", other),
            }),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub overview: Option<String>,
    pub runtime_minutes: Option<u32>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub studio: Option<String>,
    pub certification: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesDetails {
    pub title: String,
    pub first_air_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub overview: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub network: Option<String>,
    pub status: Option<String>,
    /// Number of seasons, when the source reports it
    pub season_count: Option<u32>,
    /// Number of episodes across all seasons, when the source reports it
    pub episode_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonDetails {
    pub title: String,
    pub season_number: u32,
    pub air_date: Option<NaiveDate>,
    pub episode_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDetails {
    pub title: String,
    /// Canonical series this episode belongs to, once the series is known
    pub series_id: Option<MediaItemId>,
    pub series_title: Option<String>,
    pub season_number: u32,
    pub episode_number: u32,
    pub air_date: Option<NaiveDate>,
    pub runtime_minutes: Option<u32>,
    pub overview: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackDetails {
    pub title: String,
    pub artist_name: Option<String>,
    pub album_title: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration_secs: Option<u32>,
    pub year: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumDetails {
    pub title: String,
    pub artist_name: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub track_count: Option<u32>,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistDetails {
    pub name: String,
    pub sort_name: Option<String>,
    pub biography: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistDetails {
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<UserId>,
    #[serde(default)]
    pub items: Vec<MediaItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionDetails {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<MediaItemId>,
}

/// Type-specific payload of a canonical media item
///
/// The media kind of an item is derived from the payload variant, so the
/// discriminant and the payload can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details", rename_all = "snake_case")]
pub enum MediaPayload {
    Movie(MovieDetails),
    Series(SeriesDetails),
    Season(SeasonDetails),
    Episode(EpisodeDetails),
    Track(TrackDetails),
    Album(AlbumDetails),
    Artist(ArtistDetails),
    Playlist(PlaylistDetails),
    Collection(CollectionDetails),
}

impl MediaPayload {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaPayload::Movie(_) => MediaKind::Movie,
            MediaPayload::Series(_) => MediaKind::Series,
            MediaPayload::Season(_) => MediaKind::Season,
            MediaPayload::Episode(_) => MediaKind::Episode,
            MediaPayload::Track(_) => MediaKind::Track,
            MediaPayload::Album(_) => MediaKind::Album,
            MediaPayload::Artist(_) => MediaKind::Artist,
            MediaPayload::Playlist(_) => MediaKind::Playlist,
            MediaPayload::Collection(_) => MediaKind::Collection,
        }
    }

    /// Display title carried by the payload
    pub fn title(&self) -> &str {
        match self {
            MediaPayload::Movie(d) => &d.title,
            MediaPayload::Series(d) => &d.title,
            MediaPayload::Season(d) => &d.title,
            MediaPayload::Episode(d) => &d.title,
            MediaPayload::Track(d) => &d.title,
            MediaPayload::Album(d) => &d.title,
            MediaPayload::Artist(d) => &d.name,
            MediaPayload::Playlist(d) => &d.name,
            MediaPayload::Collection(d) => &d.name,
        }
    }

    pub fn release_date(&self) -> Option<NaiveDate> {
        match self {
            MediaPayload::Movie(d) => d.release_date,
            MediaPayload::Series(d) => d.first_air_date,
            MediaPayload::Season(d) => d.air_date,
            MediaPayload::Episode(d) => d.air_date,
            MediaPayload::Album(d) => d.release_date,
            MediaPayload::Track(_)
            | MediaPayload::Artist(_)
            | MediaPayload::Playlist(_)
            | MediaPayload::Collection(_) => None,
        }
    }

    /// Release year, falling back to the year of the release date
    ///
    /// Sources report an unknown year as `0`; non-positive years count as
    /// absent.
    pub fn release_year(&self) -> Option<i32> {
        let explicit = match self {
            MediaPayload::Movie(d) => d.year,
            MediaPayload::Series(d) => d.year,
            MediaPayload::Track(d) => d.year,
            MediaPayload::Album(d) => d.year,
            _ => None,
        };
        explicit
            .filter(|year| *year > 0)
            .or_else(|| self.release_date().map(|date| date.year()))
    }
}

// =============================================================================
// Identity Collections
// =============================================================================

/// Result of merging an identity entry into a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// An identical entry was already present
    Unchanged,
    /// An entry for the same key existed and its value was replaced
    Replaced,
    /// No entry for the key existed; the new entry was appended
    Appended,
}

/// Binding between a canonical item and its representation inside one source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceMapping {
    pub source_id: SourceId,
    pub source_type: SourceType,
    pub source_item_id: String,
}

impl SourceMapping {
    pub fn new(source_id: SourceId, source_type: SourceType, source_item_id: impl Into<String>) -> Self {
        Self {
            source_id,
            source_type,
            source_item_id: source_item_id.into(),
        }
    }
}

/// Ordered set of source mappings holding at most one entry per source
///
/// The only way to add entries is [`SourceMappings::merge`], which replaces
/// the item id of an existing entry for the same source in place. Values
/// deserialized from storage go through the same path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SourceMapping>", into = "Vec<SourceMapping>")]
pub struct SourceMappings(Vec<SourceMapping>);

impl SourceMappings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Replace-or-append keyed by `source_id`
    pub fn merge(&mut self, mapping: SourceMapping) -> MergeOutcome {
        match self.0.iter_mut().find(|m| m.source_id == mapping.source_id) {
            Some(existing) if *existing == mapping => MergeOutcome::Unchanged,
            Some(existing) => {
                existing.source_item_id = mapping.source_item_id;
                existing.source_type = mapping.source_type;
                MergeOutcome::Replaced
            }
            None => {
                self.0.push(mapping);
                MergeOutcome::Appended
            }
        }
    }

    pub fn get(&self, source_id: SourceId) -> Option<&SourceMapping> {
        self.0.iter().find(|m| m.source_id == source_id)
    }

    /// Drop every mapping except the one for `source_id`
    pub fn retain_source(&mut self, source_id: SourceId) {
        self.0.retain(|m| m.source_id == source_id);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceMapping> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<SourceMapping>> for SourceMappings {
    fn from(mappings: Vec<SourceMapping>) -> Self {
        let mut set = SourceMappings::new();
        for mapping in mappings {
            set.merge(mapping);
        }
        set
    }
}

impl From<SourceMappings> for Vec<SourceMapping> {
    fn from(set: SourceMappings) -> Self {
        set.0
    }
}

impl<'a> IntoIterator for &'a SourceMappings {
    type Item = &'a SourceMapping;
    type IntoIter = std::slice::Iter<'a, SourceMapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Identifier of the item in a third-party metadata catalog (e.g. "tmdb")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalId {
    pub catalog: String,
    pub id: String,
}

impl ExternalId {
    /// Catalog names are stored lowercase
    pub fn new(catalog: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into().trim().to_lowercase(),
            id: id.into(),
        }
    }
}

/// Ordered set of external identifiers holding at most one entry per catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ExternalId>", into = "Vec<ExternalId>")]
pub struct ExternalIds(Vec<ExternalId>);

impl ExternalIds {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Replace-or-append keyed by catalog name (case-insensitive)
    pub fn merge(&mut self, external_id: ExternalId) -> MergeOutcome {
        match self
            .0
            .iter_mut()
            .find(|e| e.catalog.eq_ignore_ascii_case(&external_id.catalog))
        {
            Some(existing) if existing.id == external_id.id => MergeOutcome::Unchanged,
            Some(existing) => {
                existing.id = external_id.id;
                MergeOutcome::Replaced
            }
            None => {
                self.0.push(external_id);
                MergeOutcome::Appended
            }
        }
    }

    pub fn get(&self, catalog: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.catalog.eq_ignore_ascii_case(catalog))
            .map(|e| e.id.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExternalId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ExternalId>> for ExternalIds {
    fn from(ids: Vec<ExternalId>) -> Self {
        let mut set = ExternalIds::new();
        for id in ids {
            set.merge(id);
        }
        set
    }
}

impl From<ExternalIds> for Vec<ExternalId> {
    fn from(set: ExternalIds) -> Self {
        set.0
    }
}

// =============================================================================
// Canonical Media Item
// =============================================================================

/// Source-of-truth representation of one piece of media
///
/// Items returned by source adapters carry no `id`; the id is assigned when
/// the item is first persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMediaItem {
    pub id: Option<MediaItemId>,
    /// Denormalized from the payload
    pub title: String,
    /// Denormalized from the payload
    pub release_date: Option<NaiveDate>,
    /// Denormalized from the payload
    pub release_year: Option<i32>,
    pub payload: MediaPayload,
    pub sources: SourceMappings,
    pub external_ids: ExternalIds,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CanonicalMediaItem {
    /// Build an unsaved item with its denormalized fields taken from `payload`
    pub fn new(payload: MediaPayload) -> Self {
        let mut item = Self {
            id: None,
            title: String::new(),
            release_date: None,
            release_year: None,
            payload,
            sources: SourceMappings::new(),
            external_ids: ExternalIds::new(),
            created_at: None,
            updated_at: None,
        };
        item.refresh_denormalized();
        item
    }

    pub fn with_source(mut self, mapping: SourceMapping) -> Self {
        self.sources.merge(mapping);
        self
    }

    pub fn with_external_id(mut self, external_id: ExternalId) -> Self {
        self.external_ids.merge(external_id);
        self
    }

    pub fn kind(&self) -> MediaKind {
        self.payload.kind()
    }

    /// Copy title and release fields from the payload onto the item
    pub fn refresh_denormalized(&mut self) {
        self.title = self.payload.title().to_string();
        self.release_date = self.payload.release_date();
        self.release_year = self.payload.release_year();
    }

    /// Validate item data before persisting
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err(format!("{} title cannot be empty", self.kind()));
        }

        if let Some(year) = self.release_year {
            if !(1800..=2200).contains(&year) {
                return Err(format!("Release year {} is out of valid range", year));
            }
        }

        Ok(())
    }
}

/// Union of two genre lists, incoming order first, case-insensitive
pub fn merge_genres(incoming: &[String], existing: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(incoming.len() + existing.len());
    for genre in incoming.iter().chain(existing.iter()) {
        let genre = genre.trim();
        if genre.is_empty() {
            continue;
        }
        if !merged.iter().any(|g| g.eq_ignore_ascii_case(genre)) {
            merged.push(genre.to_string());
        }
    }
    merged
}

// =============================================================================
// Playback
// =============================================================================

/// Played percentage at or above which a play counts as completed
pub const COMPLETION_THRESHOLD_PERCENT: f64 = 90.0;

/// One user's engagement state with one canonical item
///
/// Records produced by a source adapter identify the played item through
/// `source` and `media_kind`; `media_item_id` is filled in once the item has
/// been reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackRecord {
    pub id: Option<i64>,
    pub user_id: UserId,
    pub media_item_id: Option<MediaItemId>,
    pub media_kind: MediaKind,
    pub source: Option<SourceMapping>,
    pub play_count: u32,
    pub position_secs: u64,
    pub duration_secs: u64,
    pub played_percentage: f64,
    pub completed: bool,
    pub favorite: bool,
    pub rating: Option<f32>,
    pub first_played_at: Option<DateTime<Utc>>,
    pub last_played_at: Option<DateTime<Utc>>,
}

impl PlaybackRecord {
    pub fn new(user_id: UserId, media_kind: MediaKind) -> Self {
        Self {
            id: None,
            user_id,
            media_item_id: None,
            media_kind,
            source: None,
            play_count: 0,
            position_secs: 0,
            duration_secs: 0,
            played_percentage: 0.0,
            completed: false,
            favorite: false,
            rating: None,
            first_played_at: None,
            last_played_at: None,
        }
    }

    pub fn is_completion(percentage: f64) -> bool {
        percentage >= COMPLETION_THRESHOLD_PERCENT
    }

    /// Fold a newer observation of the same (user, item) pair into this record
    ///
    /// Absorbing the same observation twice leaves the record unchanged, and
    /// `completed` never goes from true back to false. `favorite` belongs to
    /// the stored record and is never taken from an observation.
    pub fn absorb(&mut self, observed: &PlaybackRecord) {
        let observed_is_current = match (self.last_played_at, observed.last_played_at) {
            (Some(stored), Some(seen)) => seen >= stored,
            (None, _) => true,
            (Some(_), None) => false,
        };

        self.play_count = self.play_count.max(observed.play_count);
        self.first_played_at = match (self.first_played_at, observed.first_played_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_played_at = match (self.last_played_at, observed.last_played_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        if observed_is_current {
            self.position_secs = observed.position_secs;
            self.duration_secs = observed.duration_secs;
            self.played_percentage = observed.played_percentage;
        }
        if observed.rating.is_some() {
            self.rating = observed.rating;
        }

        self.completed = self.completed || observed.completed;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn movie(title: &str, year: i32) -> CanonicalMediaItem {
        CanonicalMediaItem::new(MediaPayload::Movie(MovieDetails {
            title: title.to_string(),
            year: Some(year),
            ..Default::default()
        }))
    }

    #[test]
    fn test_source_mapping_merge_replaces_same_source() {
        let mut set = SourceMappings::new();
        let a = SourceId(1);
        assert_eq!(
            set.merge(SourceMapping::new(a, SourceType::Jellyfin, "x1")),
            MergeOutcome::Appended
        );
        assert_eq!(
            set.merge(SourceMapping::new(a, SourceType::Jellyfin, "x2")),
            MergeOutcome::Replaced
        );

        assert_eq!(set.len(), 1);
        assert_eq!(set.get(a).unwrap().source_item_id, "x2");
    }

    #[test]
    fn test_source_mapping_merge_is_idempotent() {
        let mut set = SourceMappings::new();
        let mapping = SourceMapping::new(SourceId(3), SourceType::Plex, "42");
        set.merge(mapping.clone());
        assert_eq!(set.merge(mapping), MergeOutcome::Unchanged);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_source_mapping_merge_keeps_other_sources() {
        let mut set = SourceMappings::new();
        set.merge(SourceMapping::new(SourceId(1), SourceType::Jellyfin, "a"));
        set.merge(SourceMapping::new(SourceId(2), SourceType::Radarr, "b"));
        set.merge(SourceMapping::new(SourceId(2), SourceType::Radarr, "c"));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get(SourceId(1)).unwrap().source_item_id, "a");
        assert_eq!(set.get(SourceId(2)).unwrap().source_item_id, "c");
        let order: Vec<_> = set.iter().map(|m| m.source_id).collect();
        assert_eq!(order, vec![SourceId(1), SourceId(2)]);
    }

    #[test]
    fn test_source_mappings_deserialize_collapses_duplicates() {
        let json = r#"[
            {"source_id": 1, "source_type": "jellyfin", "source_item_id": "old"},
            {"source_id": 1, "source_type": "jellyfin", "source_item_id": "new"}
        ]"#;
        let set: SourceMappings = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(SourceId(1)).unwrap().source_item_id, "new");
    }

    #[test]
    fn test_external_ids_keyed_by_catalog() {
        let mut ids = ExternalIds::new();
        ids.merge(ExternalId::new("TMDB", "329865"));
        assert_eq!(ids.merge(ExternalId::new("tmdb", "329865")), MergeOutcome::Unchanged);
        assert_eq!(ids.merge(ExternalId::new("tmdb", "1")), MergeOutcome::Replaced);
        assert_eq!(ids.merge(ExternalId::new("imdb", "tt2543164")), MergeOutcome::Appended);

        assert_eq!(ids.len(), 2);
        assert_eq!(ids.get("TMDB"), Some("1"));
    }

    #[test]
    fn test_new_item_denormalizes_payload() {
        let item = CanonicalMediaItem::new(MediaPayload::Series(SeriesDetails {
            title: "Severance".to_string(),
            first_air_date: NaiveDate::from_ymd_opt(2022, 2, 18),
            ..Default::default()
        }));

        assert_eq!(item.kind(), MediaKind::Series);
        assert_eq!(item.title, "Severance");
        assert_eq!(item.release_year, Some(2022));
    }

    #[test]
    fn test_validate_rejects_empty_title() {
        assert!(movie("  ", 2016).validate().is_err());
        assert!(movie("Arrival", 2016).validate().is_ok());
        assert!(movie("Arrival", 16).validate().is_err());
    }

    #[test]
    fn test_unknown_year_is_treated_as_absent() {
        let item = movie("Untitled", 0);
        assert_eq!(item.release_year, None);
        assert!(item.validate().is_ok());

        let dated = CanonicalMediaItem::new(MediaPayload::Movie(MovieDetails {
            title: "Arrival".to_string(),
            year: Some(0),
            release_date: NaiveDate::from_ymd_opt(2016, 11, 11),
            ..Default::default()
        }));
        assert_eq!(dated.release_year, Some(2016));
    }

    #[test]
    fn test_payload_serde_tagging() {
        let item = movie("Arrival", 2016);
        let json = serde_json::to_value(&item.payload).unwrap();
        assert_eq!(json["kind"], "movie");
        assert_eq!(json["details"]["title"], "Arrival");

        let back: MediaPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, item.payload);
    }

    #[test]
    fn test_merge_genres_unions_case_insensitively() {
        let merged = merge_genres(
            &["Drama".to_string(), "Sci-Fi".to_string()],
            &["sci-fi".to_string(), "Thriller".to_string()],
        );
        assert_eq!(merged, vec!["Drama", "Sci-Fi", "Thriller"]);
    }

    #[test]
    fn test_playback_absorb_never_resets_completed() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 20, 0, 0).unwrap();

        let mut stored = PlaybackRecord::new(UserId(1), MediaKind::Movie);
        stored.played_percentage = 98.0;
        stored.completed = true;
        stored.play_count = 1;
        stored.last_played_at = Some(t0);

        let mut observed = PlaybackRecord::new(UserId(1), MediaKind::Movie);
        observed.played_percentage = 12.0;
        observed.completed = false;
        observed.play_count = 2;
        observed.position_secs = 600;
        observed.last_played_at = Some(t1);

        stored.absorb(&observed);

        assert!(stored.completed);
        assert_eq!(stored.play_count, 2);
        assert_eq!(stored.position_secs, 600);
        assert_eq!(stored.last_played_at, Some(t1));
    }

    #[test]
    fn test_playback_absorb_keeps_favorite_and_rating() {
        let t0 = Utc.with_ymd_and_hms(2024, 2, 1, 20, 0, 0).unwrap();

        let mut stored = PlaybackRecord::new(UserId(1), MediaKind::Movie);
        stored.favorite = true;
        stored.rating = Some(4.5);
        stored.last_played_at = Some(t0);

        let mut observed = PlaybackRecord::new(UserId(1), MediaKind::Movie);
        observed.played_percentage = 40.0;
        observed.last_played_at = Some(t0 + chrono::Duration::days(1));

        stored.absorb(&observed);

        assert!(stored.favorite);
        assert_eq!(stored.rating, Some(4.5));
        assert_eq!(stored.played_percentage, 40.0);
    }

    #[test]
    fn test_playback_absorb_is_idempotent() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut observed = PlaybackRecord::new(UserId(7), MediaKind::Episode);
        observed.play_count = 3;
        observed.position_secs = 120;
        observed.played_percentage = 40.0;
        observed.first_played_at = Some(t0);
        observed.last_played_at = Some(t0);

        let mut stored = observed.clone();
        stored.absorb(&observed);
        assert_eq!(stored, observed);
    }

    #[test]
    fn test_playback_absorb_ignores_stale_position() {
        let old = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();

        let mut stored = PlaybackRecord::new(UserId(1), MediaKind::Track);
        stored.position_secs = 200;
        stored.last_played_at = Some(new);

        let mut stale = PlaybackRecord::new(UserId(1), MediaKind::Track);
        stale.position_secs = 10;
        stale.first_played_at = Some(old);
        stale.last_played_at = Some(old);

        stored.absorb(&stale);
        assert_eq!(stored.position_secs, 200);
        assert_eq!(stored.first_played_at, Some(old));
        assert_eq!(stored.last_played_at, Some(new));
    }

    #[test]
    fn test_completion_threshold() {
        assert!(!PlaybackRecord::is_completion(89.9));
        assert!(PlaybackRecord::is_completion(90.0));
    }

    #[test]
    fn test_source_type_round_trip_strings() {
        assert_eq!("Jellyfin".parse::<SourceType>().unwrap(), SourceType::Jellyfin);
        assert_eq!(SourceType::Sonarr.as_str(), "sonarr");
        assert!("kodi".parse::<SourceType>().is_err());
    }
}
