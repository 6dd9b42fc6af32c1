//! Media type tokens
//!
//! Schedules and manual requests name what to sync with a free-form token
//! ("Movies", "episode", "tv-shows", "music"). Parsing is case-insensitive,
//! ignores separators and accepts singular or plural forms.

use crate::{Result, SyncError};
use core_library::models::MediaKind;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Batch size for movies, series, albums and artists
pub const LARGE_ITEM_BATCH_SIZE: usize = 50;

/// Batch size for tracks, episodes and history records
pub const SMALL_ITEM_BATCH_SIZE: usize = 100;

/// What a sync run fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMediaType {
    Movies,
    Series,
    Episodes,
    Tracks,
    Albums,
    Artists,
    History,
}

impl SyncMediaType {
    /// Items per persistence batch
    pub fn batch_size(&self) -> usize {
        match self {
            SyncMediaType::Movies
            | SyncMediaType::Series
            | SyncMediaType::Albums
            | SyncMediaType::Artists => LARGE_ITEM_BATCH_SIZE,
            SyncMediaType::Tracks | SyncMediaType::Episodes | SyncMediaType::History => {
                SMALL_ITEM_BATCH_SIZE
            }
        }
    }

    /// Canonical kind produced by this sync, `None` for history
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            SyncMediaType::Movies => Some(MediaKind::Movie),
            SyncMediaType::Series => Some(MediaKind::Series),
            SyncMediaType::Episodes => Some(MediaKind::Episode),
            SyncMediaType::Tracks => Some(MediaKind::Track),
            SyncMediaType::Albums => Some(MediaKind::Album),
            SyncMediaType::Artists => Some(MediaKind::Artist),
            SyncMediaType::History => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMediaType::Movies => "movies",
            SyncMediaType::Series => "series",
            SyncMediaType::Episodes => "episodes",
            SyncMediaType::Tracks => "tracks",
            SyncMediaType::Albums => "albums",
            SyncMediaType::Artists => "artists",
            SyncMediaType::History => "history",
        }
    }
}

impl FromStr for SyncMediaType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        // "series" is its own plural; strip a single trailing 's' from the rest
        let stem = match normalized.as_str() {
            "series" => "series",
            other => other.strip_suffix('s').unwrap_or(other),
        };

        match stem {
            "movie" | "film" => Ok(SyncMediaType::Movies),
            "series" | "show" | "tvshow" | "tvserie" => Ok(SyncMediaType::Series),
            "episode" => Ok(SyncMediaType::Episodes),
            "track" | "song" | "music" => Ok(SyncMediaType::Tracks),
            "album" => Ok(SyncMediaType::Albums),
            "artist" => Ok(SyncMediaType::Artists),
            "history" | "watchhistory" | "playhistory" => Ok(SyncMediaType::History),
            _ => Err(SyncError::UnsupportedMediaType(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncMediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
