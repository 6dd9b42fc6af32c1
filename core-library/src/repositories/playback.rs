//! Playback record repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{MediaItemId, PlaybackRecord, UserId};
use crate::repositories::from_unix;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

/// Playback repository interface
///
/// Records are unique per `(user_id, media_item_id)`.
#[async_trait]
pub trait PlaybackRepository: Send + Sync {
    /// Find the record for one user and one canonical item
    async fn find(&self, user_id: UserId, media_item_id: MediaItemId)
        -> Result<Option<PlaybackRecord>>;

    /// Insert a new record and return its row ID
    ///
    /// # Errors
    /// Returns error if the record is not bound to a canonical item, a record
    /// already exists for the same user and item, or a database error occurs
    async fn insert(&self, record: &PlaybackRecord) -> Result<i64>;

    /// Update an existing record
    async fn update(&self, record: &PlaybackRecord) -> Result<()>;

    /// All records for a user, most recently played first
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<PlaybackRecord>>;
}

/// SQLite implementation of PlaybackRepository
pub struct SqlitePlaybackRepository {
    pool: SqlitePool,
}

impl SqlitePlaybackRepository {
    /// Create a new SQLite playback repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PlaybackRow {
    id: i64,
    user_id: i64,
    media_item_id: i64,
    media_kind: String,
    play_count: i64,
    position_secs: i64,
    duration_secs: i64,
    played_percentage: f64,
    completed: bool,
    favorite: bool,
    rating: Option<f64>,
    first_played_at: Option<i64>,
    last_played_at: Option<i64>,
}

impl TryFrom<PlaybackRow> for PlaybackRecord {
    type Error = LibraryError;

    fn try_from(row: PlaybackRow) -> Result<Self> {
        Ok(PlaybackRecord {
            id: Some(row.id),
            user_id: UserId(row.user_id),
            media_item_id: Some(MediaItemId(row.media_item_id)),
            media_kind: row.media_kind.parse()?,
            source: None,
            play_count: row.play_count.max(0) as u32,
            position_secs: row.position_secs.max(0) as u64,
            duration_secs: row.duration_secs.max(0) as u64,
            played_percentage: row.played_percentage,
            completed: row.completed,
            favorite: row.favorite,
            rating: row.rating.map(|r| r as f32),
            first_played_at: row.first_played_at.and_then(from_unix),
            last_played_at: row.last_played_at.and_then(from_unix),
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, media_item_id, media_kind, play_count, position_secs,
           duration_secs, played_percentage, completed, favorite, rating,
           first_played_at, last_played_at
    FROM playback_records
"#;

#[async_trait]
impl PlaybackRepository for SqlitePlaybackRepository {
    async fn find(
        &self,
        user_id: UserId,
        media_item_id: MediaItemId,
    ) -> Result<Option<PlaybackRecord>> {
        let sql = format!("{} WHERE user_id = ? AND media_item_id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, PlaybackRow>(&sql)
            .bind(user_id.0)
            .bind(media_item_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PlaybackRecord::try_from).transpose()
    }

    async fn insert(&self, record: &PlaybackRecord) -> Result<i64> {
        let media_item_id = record.media_item_id.ok_or_else(|| LibraryError::InvalidInput {
            field: "media_item_id".to_string(),
            message: "playback record is not bound to a canonical item".to_string(),
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO playback_records (
                user_id, media_item_id, media_kind, play_count, position_secs,
                duration_secs, played_percentage, completed, favorite, rating,
                first_played_at, last_played_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.user_id.0)
        .bind(media_item_id.0)
        .bind(record.media_kind.as_str())
        .bind(record.play_count as i64)
        .bind(record.position_secs as i64)
        .bind(record.duration_secs as i64)
        .bind(record.played_percentage)
        .bind(record.completed)
        .bind(record.favorite)
        .bind(record.rating.map(f64::from))
        .bind(record.first_played_at.map(|t| t.timestamp()))
        .bind(record.last_played_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(&self, record: &PlaybackRecord) -> Result<()> {
        let id = record.id.ok_or_else(|| LibraryError::InvalidInput {
            field: "id".to_string(),
            message: "cannot update a playback record that was never persisted".to_string(),
        })?;

        let result = sqlx::query(
            r#"
            UPDATE playback_records SET
                play_count = ?,
                position_secs = ?,
                duration_secs = ?,
                played_percentage = ?,
                completed = ?,
                favorite = ?,
                rating = ?,
                first_played_at = ?,
                last_played_at = ?
            WHERE id = ?
            "#,
        )
        .bind(record.play_count as i64)
        .bind(record.position_secs as i64)
        .bind(record.duration_secs as i64)
        .bind(record.played_percentage)
        .bind(record.completed)
        .bind(record.favorite)
        .bind(record.rating.map(f64::from))
        .bind(record.first_played_at.map(|t| t.timestamp()))
        .bind(record.last_played_at.map(|t| t.timestamp()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "playback_record".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<PlaybackRecord>> {
        let sql = format!(
            "{} WHERE user_id = ? ORDER BY last_played_at DESC, id DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PlaybackRow>(&sql)
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(PlaybackRecord::try_from)
            .collect::<Result<Vec<_>>>()
    }
}
