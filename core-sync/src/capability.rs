//! Capability checks run before any fetch
//!
//! A source must both advertise a capability and hand out the matching
//! interface; anything else is a capability mismatch.

use crate::{Result, SyncError};
use bridge_traits::source::{MediaSource, MovieSource, MusicSource, SeriesSource};

fn missing(source: &dyn MediaSource, capability: &str) -> SyncError {
    SyncError::CapabilityMissing {
        source_id: source.source_id(),
        capability: capability.to_string(),
    }
}

pub(crate) fn movies(source: &dyn MediaSource) -> Result<&dyn MovieSource> {
    source
        .movies()
        .filter(|_| source.supports_movies())
        .ok_or_else(|| missing(source, "movies"))
}

pub(crate) fn series(source: &dyn MediaSource) -> Result<&dyn SeriesSource> {
    source
        .series()
        .filter(|_| source.supports_series())
        .ok_or_else(|| missing(source, "series"))
}

pub(crate) fn music(source: &dyn MediaSource) -> Result<&dyn MusicSource> {
    source
        .music()
        .filter(|_| source.supports_music())
        .ok_or_else(|| missing(source, "music"))
}
