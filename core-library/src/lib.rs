//! # Canonical Catalog Module
//!
//! Owns the canonical media catalog and provides repository patterns for
//! data access.
//!
//! ## Overview
//!
//! This module manages:
//! - The canonical media model (`CanonicalMediaItem`, `MediaPayload`)
//! - Source mappings and external catalog identifiers with their merge rules
//! - Per-user playback records
//! - SQLite schema, migrations and connection pooling
//! - Repository traits and SQLite implementations for media items and playback

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
pub use models::{
    AlbumDetails, ArtistDetails, CanonicalMediaItem, CollectionDetails, EpisodeDetails,
    ExternalId, ExternalIds, MediaItemId, MediaKind, MediaPayload, MergeOutcome, MovieDetails,
    PlaybackRecord, PlaylistDetails, SeasonDetails, SeriesDetails, SourceId, SourceMapping,
    SourceMappings, SourceType, TrackDetails, UserId,
};
