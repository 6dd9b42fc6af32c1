//! # Adapter Bridge Traits
//!
//! Capability traits that every client adapter must implement.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync engine and the adapters
//! that talk to external media servers. Each trait represents one capability
//! the engine may ask a source for; adapters implement only what their
//! backend can actually serve.
//!
//! ## Traits
//!
//! ### Sources
//! - [`MediaSource`](source::MediaSource) - Connected adapter with capability probes
//! - [`MovieSource`](source::MovieSource) - Movie listings
//! - [`SeriesSource`](source::SeriesSource) - Series / season / episode traversal
//! - [`MusicSource`](source::MusicSource) - Track, album and artist listings
//! - [`HistorySource`](source::HistorySource) - Per-user playback history
//! - [`SourceFactory`](source::SourceFactory) - Configuration lookup and connection
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Fail-Fast Strategy
//!
//! The engine checks capabilities before fetching anything. An adapter that
//! advertises a capability through its `supports_*` probe but does not return
//! the matching interface fails the run with a capability error:
//!
//! ```ignore
//! let movies = source
//!     .movies()
//!     .filter(|_| source.supports_movies())
//!     .ok_or_else(|| SyncError::CapabilityMissing {
//!         source_id: source.source_id(),
//!         capability: "movies".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapter
//! implementations should convert transport errors into it and include enough
//! context (source, item ID) to act on the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so adapters can be shared
//! across async tasks.

pub mod error;
pub mod source;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use source::{
    HistorySource, MediaSource, MovieSource, MusicSource, QueryOptions, SeriesSource,
    SourceConfig, SourceFactory,
};
pub use time::{Clock, FixedClock, LogLevel, SystemClock};
