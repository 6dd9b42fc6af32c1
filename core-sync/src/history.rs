//! # History Reconciliation
//!
//! Maps a source's playback history onto canonical items and stores one
//! playback record per (user, item) for the run's owner.
//!
//! ## Flow
//!
//! - The source must expose [`HistorySource`]; otherwise the run fails with
//!   a capability error. A source that exposes it but does not declare
//!   `supports_history()` is skipped without error.
//! - Each record is resolved through the source mapping it carries.
//! - A movie that is not in the catalog yet is fetched by ID and created.
//!   Other kinds are not created on demand and their records are skipped.
//! - Each batch first fetches the movies it is missing. Cancellation is
//!   honoured before and during those fetches; once the batch starts
//!   writing it runs to the end.
//! - Records for albums, artists, playlists, collections and seasons are
//!   ignored.
//! - Stored records absorb new observations, so replaying the same history
//!   changes nothing and `completed` never goes back to false.

use crate::cancel::{self, adapter_call};
use crate::job::JobRunId;
use crate::media_type::SMALL_ITEM_BATCH_SIZE;
use crate::progress::ProgressReporter;
use crate::upsert::BatchUpsertProcessor;
use crate::{Result, SyncError};
use bridge_traits::source::{MediaSource, QueryOptions};
use core_library::models::{
    CanonicalMediaItem, MediaItemId, MediaKind, PlaybackRecord, SourceId, UserId,
};
use core_library::repositories::PlaybackRepository;
use core_runtime::events::{CoreEvent, LibraryEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Counters for one history sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub fetched: u64,
    /// New playback records
    pub inserted: u64,
    /// Existing records that absorbed an observation
    pub updated: u64,
    /// Canonical items created on demand
    pub items_created: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Result of a history sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySyncOutcome {
    Synced(HistoryStats),
    /// The source does not declare history support
    NotSupported,
}

enum RecordOutcome {
    Inserted,
    Updated,
    Skipped,
    Failed,
}

/// Writes source playback history into per-user playback records
pub struct HistoryReconciler {
    playback: Arc<dyn PlaybackRepository>,
    processor: Arc<BatchUpsertProcessor>,
    reporter: Arc<ProgressReporter>,
}

impl HistoryReconciler {
    pub fn new(
        playback: Arc<dyn PlaybackRepository>,
        processor: Arc<BatchUpsertProcessor>,
        reporter: Arc<ProgressReporter>,
    ) -> Self {
        Self {
            playback,
            processor,
            reporter,
        }
    }

    /// Sync `owner`'s playback history from `source`
    #[instrument(skip_all, fields(source_id = %source_id, user_id = %owner, job_id = %job_id))]
    pub async fn sync_history(
        &self,
        source: &dyn MediaSource,
        source_id: SourceId,
        owner: UserId,
        job_id: &JobRunId,
        cancel: &CancellationToken,
    ) -> Result<HistorySyncOutcome> {
        let Some(history) = source.history() else {
            return Err(SyncError::CapabilityMissing {
                source_id,
                capability: "history".to_string(),
            });
        };

        if !source.supports_history() {
            info!("Source {} does not declare history support, skipping", source_id);
            self.reporter
                .set_progress(job_id, 100, "History not supported by source")
                .await?;
            return Ok(HistorySyncOutcome::NotSupported);
        }

        let options = QueryOptions {
            user_id: Some(owner),
            ..Default::default()
        };
        let records = adapter_call(cancel, history.get_play_history(&options)).await?;
        let total = records.len();
        info!("Fetched {} history records from source {}", total, source_id);

        let mut stats = HistoryStats {
            fetched: total as u64,
            ..Default::default()
        };

        if total == 0 {
            self.reporter
                .set_progress(job_id, 100, "No history to process")
                .await?;
            return Ok(HistorySyncOutcome::Synced(stats));
        }

        let mut done = 0usize;
        for batch in records.chunks(SMALL_ITEM_BATCH_SIZE) {
            cancel::check(cancel)?;
            let mut missing = self
                .fetch_missing_movies(source, batch, source_id, cancel)
                .await?;

            for record in batch {
                match self
                    .reconcile_record(record, source_id, owner, &mut missing, &mut stats)
                    .await?
                {
                    RecordOutcome::Inserted => stats.inserted += 1,
                    RecordOutcome::Updated => stats.updated += 1,
                    RecordOutcome::Skipped => stats.skipped += 1,
                    RecordOutcome::Failed => stats.failed += 1,
                }
            }

            done += batch.len();
            self.reporter
                .set_progress(
                    job_id,
                    (done * 100 / total) as u8,
                    &format!("Processed {}/{} history records", done, total),
                )
                .await?;
        }

        if let Some(bus) = self.reporter.event_bus() {
            bus.emit(CoreEvent::Library(LibraryEvent::PlaybackUpdated {
                user_id: owner.0,
                source_id: source_id.0,
                records: stats.inserted + stats.updated,
            }))
            .ok();
        }

        Ok(HistorySyncOutcome::Synced(stats))
    }

    /// Fetch the movies a batch references that the catalog does not know yet
    ///
    /// Keyed by source item ID; `None` means the source no longer knows the
    /// movie.
    async fn fetch_missing_movies(
        &self,
        source: &dyn MediaSource,
        batch: &[PlaybackRecord],
        source_id: SourceId,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Option<CanonicalMediaItem>>> {
        let mut missing = HashMap::new();

        for record in batch {
            if record.media_kind != MediaKind::Movie {
                continue;
            }
            let Some(mapping) = record.source.as_ref().filter(|m| m.source_id == source_id) else {
                continue;
            };
            if missing.contains_key(&mapping.source_item_id)
                || self
                    .processor
                    .resolver()
                    .resolve_canonical_id(source_id, &mapping.source_item_id)
                    .await?
                    .is_some()
            {
                continue;
            }

            let Some(movies) = source.movies().filter(|_| source.supports_movies()) else {
                warn!(source_item_id = %mapping.source_item_id, "Source cannot fetch movies, skipping history record");
                missing.insert(mapping.source_item_id.clone(), None);
                continue;
            };

            let movie = adapter_call(cancel, movies.get_movie_by_id(&mapping.source_item_id)).await?;
            missing.insert(mapping.source_item_id.clone(), movie);
        }

        Ok(missing)
    }

    async fn reconcile_record(
        &self,
        record: &PlaybackRecord,
        source_id: SourceId,
        owner: UserId,
        missing: &mut HashMap<String, Option<CanonicalMediaItem>>,
        stats: &mut HistoryStats,
    ) -> Result<RecordOutcome> {
        if !is_history_kind(record.media_kind) {
            debug!(kind = %record.media_kind, "Ignoring history record of unsupported kind");
            return Ok(RecordOutcome::Skipped);
        }

        let Some(mapping) = record.source.as_ref().filter(|m| m.source_id == source_id) else {
            debug!("Ignoring history record without mapping for source {}", source_id);
            return Ok(RecordOutcome::Skipped);
        };

        let item_id = match self
            .processor
            .resolver()
            .resolve_canonical_id(source_id, &mapping.source_item_id)
            .await?
        {
            Some(id) => id,
            None => match self
                .create_on_demand(record.media_kind, source_id, &mapping.source_item_id, missing)
                .await?
            {
                Some(id) => {
                    stats.items_created += 1;
                    id
                }
                None => return Ok(RecordOutcome::Skipped),
            },
        };

        let mut observed = record.clone();
        observed.id = None;
        observed.user_id = owner;
        observed.media_item_id = Some(item_id);
        observed.completed = PlaybackRecord::is_completion(observed.played_percentage);

        let result = match self.playback.find(owner, item_id).await? {
            Some(mut stored) => {
                stored.absorb(&observed);
                self.playback
                    .update(&stored)
                    .await
                    .map(|_| RecordOutcome::Updated)
            }
            None => self
                .playback
                .insert(&observed)
                .await
                .map(|_| RecordOutcome::Inserted),
        };

        Ok(match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "Failed to store playback record");
                RecordOutcome::Failed
            }
        })
    }

    /// Create a canonical item for a history record that references an item
    /// the catalog has not seen yet
    ///
    /// Only movies can be created, from what [`Self::fetch_missing_movies`]
    /// brought in for the batch.
    async fn create_on_demand(
        &self,
        kind: MediaKind,
        source_id: SourceId,
        source_item_id: &str,
        missing: &mut HashMap<String, Option<CanonicalMediaItem>>,
    ) -> Result<Option<MediaItemId>> {
        if kind != MediaKind::Movie {
            warn!(%kind, %source_item_id, "No canonical item for history record, skipping");
            return Ok(None);
        }

        let Some(movie) = missing.remove(source_item_id).flatten() else {
            warn!(%source_item_id, "Movie could not be fetched from source, skipping history record");
            return Ok(None);
        };

        let outcome = self.processor.upsert_single(&movie, source_id).await?;
        if outcome.media_item_id().is_none() {
            warn!(%source_item_id, ?outcome, "Could not create movie from history record");
        }
        Ok(outcome.media_item_id())
    }
}

fn is_history_kind(kind: MediaKind) -> bool {
    matches!(
        kind,
        MediaKind::Movie | MediaKind::Series | MediaKind::Episode | MediaKind::Track
    )
}
