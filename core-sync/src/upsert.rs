//! # Batch Upsert Processor
//!
//! Fetches one media type from a source and reconciles every record into the
//! canonical catalog.
//!
//! ## Overview
//!
//! 1. Check the source's capability, then fetch the full listing in one call
//!    (episodes use a series → seasons → episodes traversal).
//! 2. Split the listing into batches (50 for movies, series, albums and
//!    artists, 100 for tracks and episodes).
//! 3. Per item:
//!    - no mapping for the active source: skipped
//!    - mapping resolves: identities merged, payload and denormalized fields
//!      overwritten, item updated
//!    - mapping unknown: item inserted
//!    - persisting the item fails: logged and counted, the batch continues
//! 4. After each batch, progress is `50 + processed * 50 / total`.
//!
//! A failing lookup (the store cannot be queried) aborts the batch and the
//! run; batches committed earlier stay committed. Batches are serialized
//! through the processor's write lock; an orchestrator owns one processor, so
//! concurrent runs never interleave canonical writes.
//! Cancellation is checked before each batch and raced against every adapter
//! call, never mid-batch.

use crate::cancel::{self, adapter_call};
use crate::capability;
use crate::identity::IdentityResolver;
use crate::job::JobRunId;
use crate::media_type::SyncMediaType;
use crate::progress::ProgressReporter;
use crate::{Result, SyncError};
use bridge_traits::source::{MediaSource, QueryOptions, SeriesSource};
use core_library::error::LibraryError;
use core_library::models::{
    merge_genres, CanonicalMediaItem, MediaItemId, MediaPayload, SourceId,
};
use core_library::repositories::MediaItemRepository;
use core_runtime::events::{CoreEvent, LibraryEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Counters for one media type sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertStats {
    /// Records returned by the source
    pub fetched: u64,
    /// Canonical items inserted
    pub created: u64,
    /// Canonical items updated in place
    pub updated: u64,
    /// Records without a mapping for the active source
    pub skipped: u64,
    /// Records that failed to persist
    pub failed: u64,
}

impl UpsertStats {
    /// Items written (`created + updated`)
    pub fn processed(&self) -> u64 {
        self.created + self.updated
    }

    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Created(_) => self.created += 1,
            ItemOutcome::Updated(_) => self.updated += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// What happened to a single incoming record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created(MediaItemId),
    Updated(MediaItemId),
    Skipped,
    /// Persistence failed; the message is logged and the run continues
    Failed(String),
}

impl ItemOutcome {
    /// Canonical ID the record ended up bound to
    pub fn media_item_id(&self) -> Option<MediaItemId> {
        match self {
            ItemOutcome::Created(id) | ItemOutcome::Updated(id) => Some(*id),
            _ => None,
        }
    }
}

/// Reconciles fetched listings into the canonical catalog
pub struct BatchUpsertProcessor {
    items: Arc<dyn MediaItemRepository>,
    resolver: IdentityResolver,
    reporter: Arc<ProgressReporter>,
    write_lock: Arc<Mutex<()>>,
}

impl BatchUpsertProcessor {
    pub fn new(items: Arc<dyn MediaItemRepository>, reporter: Arc<ProgressReporter>) -> Self {
        Self {
            resolver: IdentityResolver::new(Arc::clone(&items)),
            items,
            reporter,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Sync one media type from `source` into the catalog
    ///
    /// # Errors
    ///
    /// - [`SyncError::CapabilityMissing`] before anything is fetched
    /// - [`SyncError::UnsupportedMediaType`] for history, which has its own path
    /// - adapter, lookup and cancellation errors abort the run
    #[instrument(skip_all, fields(source_id = %source_id, media_type = %media_type, job_id = %job_id))]
    pub async fn sync_media_type(
        &self,
        source: &dyn MediaSource,
        media_type: SyncMediaType,
        source_id: SourceId,
        job_id: &JobRunId,
        cancel: &CancellationToken,
    ) -> Result<UpsertStats> {
        let options = QueryOptions::default();

        let fetched = match media_type {
            SyncMediaType::Movies => {
                let movies = capability::movies(source)?;
                adapter_call(cancel, movies.get_movies(&options)).await?
            }
            SyncMediaType::Series => {
                let series = capability::series(source)?;
                let listing = adapter_call(cancel, series.get_series(&options)).await?;
                self.fill_series_counts(series, listing, source_id, cancel)
                    .await?
            }
            SyncMediaType::Episodes => {
                let series = capability::series(source)?;
                self.fetch_episodes(series, source_id, job_id, cancel).await?
            }
            SyncMediaType::Tracks => {
                let music = capability::music(source)?;
                adapter_call(cancel, music.get_music_tracks(&options)).await?
            }
            SyncMediaType::Albums => {
                let music = capability::music(source)?;
                adapter_call(cancel, music.get_music_albums(&options)).await?
            }
            SyncMediaType::Artists => {
                let music = capability::music(source)?;
                adapter_call(cancel, music.get_music_artists(&options)).await?
            }
            SyncMediaType::History => {
                return Err(SyncError::UnsupportedMediaType(
                    "history is not a catalog media type".to_string(),
                ))
            }
        };

        info!("Fetched {} {} from source {}", fetched.len(), media_type, source_id);
        self.reporter
            .set_progress(
                job_id,
                50,
                &format!("Fetched {} {}", fetched.len(), media_type),
            )
            .await?;

        self.upsert_all(fetched, media_type, source_id, job_id, cancel)
            .await
    }

    /// Reconcile a listing in batches
    async fn upsert_all(
        &self,
        fetched: Vec<CanonicalMediaItem>,
        media_type: SyncMediaType,
        source_id: SourceId,
        job_id: &JobRunId,
        cancel: &CancellationToken,
    ) -> Result<UpsertStats> {
        let total = fetched.len();
        let mut stats = UpsertStats {
            fetched: total as u64,
            ..Default::default()
        };

        if total == 0 {
            self.reporter
                .set_progress(job_id, 100, &format!("No {} to process", media_type))
                .await?;
            return Ok(stats);
        }

        for (index, batch) in fetched.chunks(media_type.batch_size()).enumerate() {
            cancel::check(cancel)?;

            let mut batch_stats = UpsertStats::default();
            {
                let _guard = self.write_lock.lock().await;
                for incoming in batch {
                    let outcome = self.reconcile_item(incoming, source_id).await?;
                    batch_stats.record(&outcome);
                }
            }

            stats.created += batch_stats.created;
            stats.updated += batch_stats.updated;
            stats.skipped += batch_stats.skipped;
            stats.failed += batch_stats.failed;

            debug!(
                batch = index,
                created = batch_stats.created,
                updated = batch_stats.updated,
                skipped = batch_stats.skipped,
                failed = batch_stats.failed,
                "Batch committed"
            );
            self.emit_catalog_update(media_type, source_id, &batch_stats);

            let percent = 50 + (stats.processed() * 50 / total as u64).min(50) as u8;
            self.reporter
                .set_progress(
                    job_id,
                    percent,
                    &format!("Processed {}/{} {}", stats.processed(), total, media_type),
                )
                .await?;
        }

        if stats.failed > 0 {
            warn!(
                "{} of {} {} failed to persist",
                stats.failed, total, media_type
            );
        }

        Ok(stats)
    }

    /// Reconcile a single record while holding the write lock
    pub async fn upsert_single(
        &self,
        incoming: &CanonicalMediaItem,
        source_id: SourceId,
    ) -> Result<ItemOutcome> {
        let _guard = self.write_lock.lock().await;
        self.reconcile_item(incoming, source_id).await
    }

    /// Reconcile one record; the caller is responsible for locking
    ///
    /// # Errors
    ///
    /// Only lookup failures are errors. Persistence failures come back as
    /// [`ItemOutcome::Failed`].
    async fn reconcile_item(
        &self,
        incoming: &CanonicalMediaItem,
        source_id: SourceId,
    ) -> Result<ItemOutcome> {
        let Some(mapping) = incoming.sources.get(source_id) else {
            debug!(title = %incoming.title, "Skipping record without mapping for source {}", source_id);
            return Ok(ItemOutcome::Skipped);
        };

        let existing = self
            .resolver
            .resolve(source_id, &mapping.source_item_id)
            .await?;

        let result = match existing {
            Some(stored) => self.update_existing(stored, incoming, source_id).await,
            None => self.insert_new(incoming, source_id).await,
        };

        Ok(match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    source_item_id = %mapping.source_item_id,
                    title = %incoming.title,
                    error = %e,
                    "Failed to persist item"
                );
                ItemOutcome::Failed(e.to_string())
            }
        })
    }

    async fn insert_new(
        &self,
        incoming: &CanonicalMediaItem,
        source_id: SourceId,
    ) -> Result<ItemOutcome> {
        let mut item = incoming.clone();
        item.id = None;
        item.sources.retain_source(source_id);
        item.refresh_denormalized();

        match self.items.insert(&item).await {
            Ok(id) => {
                debug!(item_id = %id, title = %item.title, "Created canonical item");
                Ok(ItemOutcome::Created(id))
            }
            Err(LibraryError::DuplicateSourceMapping { source_item_id, .. }) => {
                // Another run created the item between lookup and insert
                debug!(%source_item_id, "Mapping claimed concurrently, merging instead");
                match self.resolver.resolve(source_id, &source_item_id).await? {
                    Some(stored) => self.update_existing(stored, incoming, source_id).await,
                    None => Err(SyncError::Library(LibraryError::DuplicateSourceMapping {
                        source_id: source_id.0,
                        source_item_id,
                    })),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_existing(
        &self,
        mut stored: CanonicalMediaItem,
        incoming: &CanonicalMediaItem,
        source_id: SourceId,
    ) -> Result<ItemOutcome> {
        let id = stored
            .id
            .ok_or_else(|| SyncError::Database("stored item has no id".to_string()))?;

        if stored.kind() != incoming.kind() {
            return Err(SyncError::KindMismatch {
                item_id: id,
                stored: stored.kind(),
                incoming: incoming.kind(),
            });
        }

        IdentityResolver::merge_identities(&mut stored, incoming, source_id);
        stored.payload = merge_payload(&stored.payload, incoming.payload.clone());
        stored.refresh_denormalized();

        self.items.update(&stored).await?;
        debug!(item_id = %id, title = %stored.title, "Updated canonical item");
        Ok(ItemOutcome::Updated(id))
    }

    /// Fill missing season and episode counts from the series' seasons
    async fn fill_series_counts(
        &self,
        series_source: &dyn SeriesSource,
        mut listing: Vec<CanonicalMediaItem>,
        source_id: SourceId,
        cancel: &CancellationToken,
    ) -> Result<Vec<CanonicalMediaItem>> {
        for series in &mut listing {
            let Some(series_item_id) = series
                .sources
                .get(source_id)
                .map(|m| m.source_item_id.clone())
            else {
                continue;
            };

            let MediaPayload::Series(details) = &mut series.payload else {
                continue;
            };
            if details.season_count.is_some() && details.episode_count.is_some() {
                continue;
            }

            let seasons = match adapter_call(
                cancel,
                series_source.get_series_seasons(&series_item_id),
            )
            .await
            {
                Ok(seasons) => seasons,
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(%series_item_id, error = %e, "Could not load seasons to compute counts");
                    continue;
                }
            };

            if details.season_count.is_none() {
                details.season_count = Some(seasons.len() as u32);
            }
            if details.episode_count.is_none() {
                let counts: Vec<u32> = seasons
                    .iter()
                    .filter_map(|season| match &season.payload {
                        MediaPayload::Season(season) => season.episode_count,
                        _ => None,
                    })
                    .collect();
                if !counts.is_empty() {
                    details.episode_count = Some(counts.iter().sum());
                }
            }
        }

        Ok(listing)
    }

    /// Walk series → seasons → episodes and collect every episode
    ///
    /// One call per series and per season, sequentially. Progress moves
    /// through 0–50 as series are visited.
    async fn fetch_episodes(
        &self,
        series_source: &dyn SeriesSource,
        source_id: SourceId,
        job_id: &JobRunId,
        cancel: &CancellationToken,
    ) -> Result<Vec<CanonicalMediaItem>> {
        let listing = adapter_call(cancel, series_source.get_series(&QueryOptions::default())).await?;
        let total = listing.len();
        let mut episodes = Vec::new();

        for (index, series) in listing.iter().enumerate() {
            cancel::check(cancel)?;

            let Some(mapping) = series.sources.get(source_id) else {
                warn!(title = %series.title, "Skipping series without mapping for source {}", source_id);
                continue;
            };

            let series_id = self
                .resolver
                .resolve_canonical_id(source_id, &mapping.source_item_id)
                .await?;

            let seasons = adapter_call(
                cancel,
                series_source.get_series_seasons(&mapping.source_item_id),
            )
            .await?;

            for season in &seasons {
                let Some(season_mapping) = season.sources.get(source_id) else {
                    warn!(
                        series = %series.title,
                        season = %season.title,
                        "Skipping season without mapping for source {}",
                        source_id
                    );
                    continue;
                };

                let mut season_episodes = adapter_call(
                    cancel,
                    series_source
                        .get_series_episodes(&mapping.source_item_id, &season_mapping.source_item_id),
                )
                .await?;

                for episode in &mut season_episodes {
                    if let MediaPayload::Episode(details) = &mut episode.payload {
                        if details.series_id.is_none() {
                            details.series_id = series_id;
                        }
                        if details.series_title.is_none() {
                            details.series_title = Some(series.title.clone());
                        }
                    }
                }
                episodes.extend(season_episodes);
            }

            let percent = ((index + 1) * 50 / total) as u8;
            self.reporter
                .set_progress(
                    job_id,
                    percent,
                    &format!("Fetched episodes for {}/{} series", index + 1, total),
                )
                .await?;
        }

        Ok(episodes)
    }

    fn emit_catalog_update(&self, media_type: SyncMediaType, source_id: SourceId, batch: &UpsertStats) {
        let Some(bus) = self.reporter.event_bus() else {
            return;
        };
        let media_kind = media_type
            .media_kind()
            .map(|kind| kind.as_str())
            .unwrap_or(media_type.as_str());

        bus.emit(CoreEvent::Library(LibraryEvent::CatalogUpdated {
            media_kind: media_kind.to_string(),
            source_id: source_id.0,
            created: batch.created,
            updated: batch.updated,
            failed: batch.failed,
        }))
        .ok();
    }
}

/// Overwrite a stored payload with an incoming one
///
/// Series keep the union of both genre lists and fall back to the stored
/// season/episode counts when the incoming payload has none. Episodes keep a
/// known series link.
pub fn merge_payload(stored: &MediaPayload, incoming: MediaPayload) -> MediaPayload {
    match (stored, incoming) {
        (MediaPayload::Series(old), MediaPayload::Series(mut new)) => {
            new.genres = merge_genres(&new.genres, &old.genres);
            new.season_count = new.season_count.or(old.season_count);
            new.episode_count = new.episode_count.or(old.episode_count);
            MediaPayload::Series(new)
        }
        (MediaPayload::Episode(old), MediaPayload::Episode(mut new)) => {
            new.series_id = new.series_id.or(old.series_id);
            MediaPayload::Episode(new)
        }
        (_, incoming) => incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::models::{EpisodeDetails, MovieDetails, SeriesDetails};

    #[test]
    fn test_merge_payload_series_unions_genres_and_keeps_counts() {
        let stored = MediaPayload::Series(SeriesDetails {
            title: "Dark".to_string(),
            genres: vec!["Drama".to_string(), "Mystery".to_string()],
            season_count: Some(3),
            episode_count: Some(26),
            ..Default::default()
        });
        let incoming = MediaPayload::Series(SeriesDetails {
            title: "Dark".to_string(),
            genres: vec!["Sci-Fi".to_string(), "drama".to_string()],
            season_count: None,
            episode_count: Some(27),
            ..Default::default()
        });

        let MediaPayload::Series(merged) = merge_payload(&stored, incoming) else {
            panic!("expected series payload");
        };
        assert_eq!(merged.genres, vec!["Sci-Fi", "drama", "Mystery"]);
        assert_eq!(merged.season_count, Some(3));
        assert_eq!(merged.episode_count, Some(27));
    }

    #[test]
    fn test_merge_payload_episode_keeps_series_link() {
        let stored = MediaPayload::Episode(EpisodeDetails {
            title: "Pilot".to_string(),
            series_id: Some(MediaItemId(5)),
            ..Default::default()
        });
        let incoming = MediaPayload::Episode(EpisodeDetails {
            title: "Pilot (Remastered)".to_string(),
            ..Default::default()
        });

        let MediaPayload::Episode(merged) = merge_payload(&stored, incoming) else {
            panic!("expected episode payload");
        };
        assert_eq!(merged.series_id, Some(MediaItemId(5)));
        assert_eq!(merged.title, "Pilot (Remastered)");
    }

    #[test]
    fn test_merge_payload_movie_overwrites() {
        let stored = MediaPayload::Movie(MovieDetails {
            title: "Arrival".to_string(),
            genres: vec!["Drama".to_string()],
            ..Default::default()
        });
        let incoming = MediaPayload::Movie(MovieDetails {
            title: "Arrival".to_string(),
            year: Some(2016),
            ..Default::default()
        });

        let merged = merge_payload(&stored, incoming.clone());
        assert_eq!(merged, incoming);
    }

    #[test]
    fn test_stats_processed() {
        let mut stats = UpsertStats::default();
        stats.record(&ItemOutcome::Created(MediaItemId(1)));
        stats.record(&ItemOutcome::Updated(MediaItemId(2)));
        stats.record(&ItemOutcome::Skipped);
        stats.record(&ItemOutcome::Failed("boom".to_string()));

        assert_eq!(stats.processed(), 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
    }
}
