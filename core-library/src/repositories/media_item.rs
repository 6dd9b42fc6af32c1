//! Canonical media item repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{
    CanonicalMediaItem, ExternalIds, MediaItemId, MediaKind, MediaPayload, SourceId,
    SourceMapping, SourceMappings,
};
use crate::repositories::from_unix;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Media item repository interface for data access operations
#[async_trait]
pub trait MediaItemRepository: Send + Sync {
    /// Find an item by its internal ID, including its source mappings
    async fn find_by_id(&self, id: MediaItemId) -> Result<Option<CanonicalMediaItem>>;

    /// Resolve the canonical ID bound to `(source_id, source_item_id)`
    ///
    /// Served by the unique `(source_id, source_item_id)` index.
    async fn find_id_by_source_mapping(
        &self,
        source_id: SourceId,
        source_item_id: &str,
    ) -> Result<Option<MediaItemId>>;

    /// Find the item whose mapping set contains `(source_id, source_item_id)`
    async fn find_by_source_mapping(
        &self,
        source_id: SourceId,
        source_item_id: &str,
    ) -> Result<Option<CanonicalMediaItem>> {
        match self.find_id_by_source_mapping(source_id, source_item_id).await? {
            Some(id) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    /// Insert a new item with its source mappings
    ///
    /// # Errors
    /// Returns error if:
    /// - Item validation fails
    /// - One of its source mappings already belongs to another item
    ///   (`LibraryError::DuplicateSourceMapping`)
    /// - Database error occurs
    async fn insert(&self, item: &CanonicalMediaItem) -> Result<MediaItemId>;

    /// Overwrite an existing item and replace its source mappings
    ///
    /// # Errors
    /// Returns error if:
    /// - The item has no ID or does not exist
    /// - Item validation fails
    /// - Database error occurs
    async fn update(&self, item: &CanonicalMediaItem) -> Result<()>;

    /// Delete an item by ID
    ///
    /// # Returns
    /// - `Ok(true)` if the item was deleted
    /// - `Ok(false)` if the item was not found
    async fn delete(&self, id: MediaItemId) -> Result<bool>;

    /// List all items of a kind in insertion order
    async fn find_by_kind(&self, kind: MediaKind) -> Result<Vec<CanonicalMediaItem>>;

    /// Count items of a kind
    async fn count_by_kind(&self, kind: MediaKind) -> Result<i64>;

    /// Count all items
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of MediaItemRepository
pub struct SqliteMediaItemRepository {
    pool: SqlitePool,
}

impl SqliteMediaItemRepository {
    /// Create a new SQLite media item repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_sources(&self, id: i64) -> Result<Vec<SourceRow>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT source_id, source_type, source_item_id
            FROM media_item_sources
            WHERE media_item_id = ?
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn write_sources(
        tx: &mut Transaction<'_, Sqlite>,
        id: i64,
        sources: &SourceMappings,
    ) -> Result<()> {
        for (position, mapping) in sources.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO media_item_sources (
                    media_item_id, source_id, source_type, source_item_id, position
                ) VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(mapping.source_id.0)
            .bind(mapping.source_type.as_str())
            .bind(&mapping.source_item_id)
            .bind(position as i64)
            .execute(&mut **tx)
            .await
            .map_err(|e| duplicate_or_database(e, mapping))?;
        }

        Ok(())
    }
}

/// Database row representation of a media item
#[derive(Debug, FromRow)]
struct MediaItemRow {
    id: i64,
    title: String,
    release_date: Option<String>,
    release_year: Option<i64>,
    payload: String,
    external_ids: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, FromRow)]
struct SourceRow {
    source_id: i64,
    source_type: String,
    source_item_id: String,
}

impl MediaItemRow {
    fn into_item(self, sources: Vec<SourceRow>) -> Result<CanonicalMediaItem> {
        let payload: MediaPayload = serde_json::from_str(&self.payload)?;
        let external_ids: ExternalIds = serde_json::from_str(&self.external_ids)?;

        let release_date = self
            .release_date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
                    LibraryError::InvalidInput {
                        field: "release_date".to_string(),
                        message: format!("{}: {}", raw, e),
                    }
                })
            })
            .transpose()?;

        let mappings = sources
            .into_iter()
            .map(|row| {
                Ok(SourceMapping::new(
                    SourceId(row.source_id),
                    row.source_type.parse()?,
                    row.source_item_id,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CanonicalMediaItem {
            id: Some(MediaItemId(self.id)),
            title: self.title,
            release_date,
            release_year: self.release_year.map(|y| y as i32),
            payload,
            sources: SourceMappings::from(mappings),
            external_ids,
            created_at: from_unix(self.created_at),
            updated_at: from_unix(self.updated_at),
        })
    }
}

fn duplicate_or_database(error: sqlx::Error, mapping: &SourceMapping) -> LibraryError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            LibraryError::DuplicateSourceMapping {
                source_id: mapping.source_id.0,
                source_item_id: mapping.source_item_id.clone(),
            }
        }
        _ => LibraryError::Database(error),
    }
}

fn validate(item: &CanonicalMediaItem) -> Result<()> {
    item.validate().map_err(|msg| LibraryError::InvalidInput {
        field: "media_item".to_string(),
        message: msg,
    })
}

#[async_trait]
impl MediaItemRepository for SqliteMediaItemRepository {
    async fn find_by_id(&self, id: MediaItemId) -> Result<Option<CanonicalMediaItem>> {
        let row = sqlx::query_as::<_, MediaItemRow>(
            r#"
            SELECT id, title, release_date, release_year, payload, external_ids,
                   created_at, updated_at
            FROM media_items
            WHERE id = ?
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let sources = self.load_sources(row.id).await?;
                row.into_item(sources).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn find_id_by_source_mapping(
        &self,
        source_id: SourceId,
        source_item_id: &str,
    ) -> Result<Option<MediaItemId>> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT media_item_id
            FROM media_item_sources
            WHERE source_id = ? AND source_item_id = ?
            "#,
        )
        .bind(source_id.0)
        .bind(source_item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(MediaItemId))
    }

    async fn insert(&self, item: &CanonicalMediaItem) -> Result<MediaItemId> {
        validate(item)?;

        let now = Utc::now().timestamp();
        let payload = serde_json::to_string(&item.payload)?;
        let external_ids = serde_json::to_string(&item.external_ids)?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO media_items (
                kind, title, release_date, release_year, payload, external_ids,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.kind().as_str())
        .bind(&item.title)
        .bind(item.release_date.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(item.release_year)
        .bind(payload)
        .bind(external_ids)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();
        Self::write_sources(&mut tx, id, &item.sources).await?;

        tx.commit().await?;

        Ok(MediaItemId(id))
    }

    async fn update(&self, item: &CanonicalMediaItem) -> Result<()> {
        let id = item.id.ok_or_else(|| LibraryError::InvalidInput {
            field: "id".to_string(),
            message: "cannot update an item that was never persisted".to_string(),
        })?;
        validate(item)?;

        let payload = serde_json::to_string(&item.payload)?;
        let external_ids = serde_json::to_string(&item.external_ids)?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE media_items SET
                kind = ?,
                title = ?,
                release_date = ?,
                release_year = ?,
                payload = ?,
                external_ids = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(item.kind().as_str())
        .bind(&item.title)
        .bind(item.release_date.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(item.release_year)
        .bind(payload)
        .bind(external_ids)
        .bind(Utc::now().timestamp())
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "media_item".to_string(),
                id: id.to_string(),
            });
        }

        sqlx::query("DELETE FROM media_item_sources WHERE media_item_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        Self::write_sources(&mut tx, id.0, &item.sources).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn delete(&self, id: MediaItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media_items WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_kind(&self, kind: MediaKind) -> Result<Vec<CanonicalMediaItem>> {
        let rows = sqlx::query_as::<_, MediaItemRow>(
            r#"
            SELECT id, title, release_date, release_year, payload, external_ids,
                   created_at, updated_at
            FROM media_items
            WHERE kind = ?
            ORDER BY id
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let sources = self.load_sources(row.id).await?;
            items.push(row.into_item(sources)?);
        }

        Ok(items)
    }

    async fn count_by_kind(&self, kind: MediaKind) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM media_items WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM media_items")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{ExternalId, MovieDetails, SeriesDetails, SourceType};

    fn arrival() -> CanonicalMediaItem {
        CanonicalMediaItem::new(MediaPayload::Movie(MovieDetails {
            title: "Arrival".to_string(),
            year: Some(2016),
            release_date: NaiveDate::from_ymd_opt(2016, 11, 11),
            genres: vec!["Sci-Fi".to_string()],
            ..Default::default()
        }))
        .with_source(SourceMapping::new(SourceId(1), SourceType::Jellyfin, "42"))
        .with_external_id(ExternalId::new("tmdb", "329865"))
    }

    async fn repo() -> SqliteMediaItemRepository {
        SqliteMediaItemRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_find_by_id() {
        let repo = repo().await;
        let id = repo.insert(&arrival()).await.unwrap();

        let found = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(found.title, "Arrival");
        assert_eq!(found.release_year, Some(2016));
        assert_eq!(found.release_date, NaiveDate::from_ymd_opt(2016, 11, 11));
        assert_eq!(found.sources.len(), 1);
        assert_eq!(found.external_ids.get("tmdb"), Some("329865"));
        assert!(found.created_at.is_some());
    }

    #[tokio::test]
    async fn test_find_by_source_mapping() {
        let repo = repo().await;
        let id = repo.insert(&arrival()).await.unwrap();

        let resolved = repo
            .find_id_by_source_mapping(SourceId(1), "42")
            .await
            .unwrap();
        assert_eq!(resolved, Some(id));

        assert!(repo
            .find_id_by_source_mapping(SourceId(2), "42")
            .await
            .unwrap()
            .is_none());

        let item = repo
            .find_by_source_mapping(SourceId(1), "42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.title, "Arrival");
    }

    #[tokio::test]
    async fn test_insert_duplicate_mapping_is_rejected() {
        let repo = repo().await;
        repo.insert(&arrival()).await.unwrap();

        let result = repo.insert(&arrival()).await;
        assert!(matches!(
            result,
            Err(LibraryError::DuplicateSourceMapping { source_id: 1, .. })
        ));

        // The failed insert rolled back its media_items row
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_payload_and_mappings() {
        let repo = repo().await;
        let id = repo.insert(&arrival()).await.unwrap();

        let mut item = repo.find_by_id(id).await.unwrap().unwrap();
        item.sources
            .merge(SourceMapping::new(SourceId(1), SourceType::Jellyfin, "43"));
        item.sources
            .merge(SourceMapping::new(SourceId(2), SourceType::Radarr, "7"));
        if let MediaPayload::Movie(details) = &mut item.payload {
            details.runtime_minutes = Some(116);
        }
        repo.update(&item).await.unwrap();

        let found = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.sources.get(SourceId(1)).unwrap().source_item_id, "43");
        assert_eq!(found.sources.get(SourceId(2)).unwrap().source_item_id, "7");
        assert!(repo
            .find_id_by_source_mapping(SourceId(1), "42")
            .await
            .unwrap()
            .is_none());
        match found.payload {
            MediaPayload::Movie(details) => assert_eq!(details.runtime_minutes, Some(116)),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_requires_existing_item() {
        let repo = repo().await;

        let unsaved = arrival();
        assert!(matches!(
            repo.update(&unsaved).await,
            Err(LibraryError::InvalidInput { .. })
        ));

        let mut ghost = arrival();
        ghost.id = Some(MediaItemId(999));
        assert!(matches!(
            repo.update(&ghost).await,
            Err(LibraryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_and_count_by_kind() {
        let repo = repo().await;
        repo.insert(&arrival()).await.unwrap();
        repo.insert(
            &CanonicalMediaItem::new(MediaPayload::Series(SeriesDetails {
                title: "Dark".to_string(),
                ..Default::default()
            }))
            .with_source(SourceMapping::new(SourceId(1), SourceType::Jellyfin, "s1")),
        )
        .await
        .unwrap();

        assert_eq!(repo.count_by_kind(MediaKind::Movie).await.unwrap(), 1);
        assert_eq!(repo.count_by_kind(MediaKind::Series).await.unwrap(), 1);
        let series = repo.find_by_kind(MediaKind::Series).await.unwrap();
        assert_eq!(series[0].title, "Dark");
    }

    #[tokio::test]
    async fn test_delete_cascades_mappings() {
        let repo = repo().await;
        let id = repo.insert(&arrival()).await.unwrap();

        assert!(repo.delete(id).await.unwrap());
        assert!(!repo.delete(id).await.unwrap());
        assert!(repo
            .find_id_by_source_mapping(SourceId(1), "42")
            .await
            .unwrap()
            .is_none());
    }
}
