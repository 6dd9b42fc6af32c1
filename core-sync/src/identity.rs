//! # Identity Resolver
//!
//! Maps `(source_id, source_item_id)` pairs to canonical item IDs and merges
//! identities onto canonical items.
//!
//! ## Rules
//!
//! - A canonical item holds at most one mapping per source. Merging a mapping
//!   for a source that is already present replaces its item ID in place;
//!   otherwise the mapping is appended.
//! - External catalog IDs follow the same replace-or-append rule keyed by
//!   catalog name (case-insensitive).
//! - When reconciling a record fetched from source A, only A's mapping is
//!   taken from the record. Mappings the adapter reports for other sources
//!   are ignored, so one source can never rewrite another's identity.

use crate::Result;
use core_library::models::{
    CanonicalMediaItem, ExternalId, MediaItemId, MergeOutcome, SourceId, SourceMapping,
};
use core_library::repositories::MediaItemRepository;
use std::sync::Arc;
use tracing::debug;

/// Resolves and merges canonical identities
#[derive(Clone)]
pub struct IdentityResolver {
    items: Arc<dyn MediaItemRepository>,
}

impl IdentityResolver {
    pub fn new(items: Arc<dyn MediaItemRepository>) -> Self {
        Self { items }
    }

    /// Look up the canonical ID bound to a source item
    ///
    /// # Errors
    ///
    /// Returns an error only when the store cannot be queried; an unknown
    /// mapping is `Ok(None)`.
    pub async fn resolve_canonical_id(
        &self,
        source_id: SourceId,
        source_item_id: &str,
    ) -> Result<Option<MediaItemId>> {
        Ok(self
            .items
            .find_id_by_source_mapping(source_id, source_item_id)
            .await?)
    }

    /// Load the canonical item bound to a source item
    pub async fn resolve(
        &self,
        source_id: SourceId,
        source_item_id: &str,
    ) -> Result<Option<CanonicalMediaItem>> {
        Ok(self
            .items
            .find_by_source_mapping(source_id, source_item_id)
            .await?)
    }

    /// Replace-or-append a source mapping
    pub fn merge_source_mapping(
        item: &mut CanonicalMediaItem,
        mapping: SourceMapping,
    ) -> MergeOutcome {
        let source_id = mapping.source_id;
        let outcome = item.sources.merge(mapping);
        if outcome != MergeOutcome::Unchanged {
            debug!(item_id = ?item.id, source_id = %source_id, ?outcome, "Merged source mapping");
        }
        outcome
    }

    /// Replace-or-append an external catalog ID
    pub fn merge_external_id(item: &mut CanonicalMediaItem, external_id: ExternalId) -> MergeOutcome {
        let catalog = external_id.catalog.clone();
        let outcome = item.external_ids.merge(external_id);
        if outcome != MergeOutcome::Unchanged {
            debug!(item_id = ?item.id, catalog = %catalog, ?outcome, "Merged external id");
        }
        outcome
    }

    /// Merge the identities carried by `incoming` (fetched from `source_id`)
    /// into `target`
    ///
    /// Only the active source's mapping is taken; every external ID is merged.
    pub fn merge_identities(
        target: &mut CanonicalMediaItem,
        incoming: &CanonicalMediaItem,
        source_id: SourceId,
    ) {
        for mapping in incoming.sources.iter() {
            if mapping.source_id == source_id {
                Self::merge_source_mapping(target, mapping.clone());
            } else {
                debug!(
                    active_source = %source_id,
                    foreign_source = %mapping.source_id,
                    "Ignoring mapping reported for another source"
                );
            }
        }

        for external_id in incoming.external_ids.iter() {
            Self::merge_external_id(target, external_id.clone());
        }
    }
}
