//! # Job Run & Schedule Repositories
//!
//! Provides database persistence for job runs and sync schedules.
//!
//! ## Overview
//!
//! - [`JobRunRepository`]: creating runs, monotonic progress updates and
//!   one-shot finalization. Every mutation is conditional on
//!   `status = 'running'`, so a finalized row can never be changed again.
//! - [`ScheduleRepository`]: schedule rows, due-ness scan and `last_run_at`
//!   bookkeeping.

use crate::job::{JobRun, JobRunId, JobStatus};
use crate::schedule::{Frequency, SyncSchedule};
use crate::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_library::models::{SourceId, UserId};
use sqlx::{FromRow, SqlitePool};

fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| SyncError::Database(format!("Invalid timestamp: {}", secs)))
}

// ============================================================================
// Job Runs
// ============================================================================

/// Repository trait for job run persistence
#[async_trait]
pub trait JobRunRepository: Send + Sync {
    /// Insert a new run
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn insert(&self, run: &JobRun) -> Result<()>;

    /// Find a run by ID
    async fn find_by_id(&self, id: &JobRunId) -> Result<Option<JobRun>>;

    /// Record progress for a running job
    ///
    /// The stored percent only ever grows. Returns `false` when the run is
    /// unknown or already finalized, in which case nothing is written.
    async fn update_progress(&self, id: &JobRunId, percent: u8, message: &str) -> Result<bool>;

    /// Finalize a running job
    ///
    /// Returns `false` when the run is unknown or already finalized.
    async fn finalize(
        &self,
        id: &JobRunId,
        status: JobStatus,
        error_message: Option<&str>,
        ended_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Runs owned by a user, most recent first
    ///
    /// # Arguments
    ///
    /// * `owner` - The user to get history for
    /// * `limit` - Maximum number of runs to return
    async fn find_by_owner(&self, owner: UserId, limit: u32) -> Result<Vec<JobRun>>;
}

/// SQLite implementation of JobRunRepository
pub struct SqliteJobRunRepository {
    pool: SqlitePool,
}

impl SqliteJobRunRepository {
    /// Create a new SQLite job run repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a job run
#[derive(Debug, FromRow)]
struct JobRunRow {
    id: String,
    job_name: String,
    owner_user_id: i64,
    status: String,
    progress_percent: i64,
    progress_message: Option<String>,
    error_message: Option<String>,
    started_at: i64,
    ended_at: Option<i64>,
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = SyncError;

    fn try_from(row: JobRunRow) -> Result<Self> {
        Ok(JobRun {
            id: JobRunId::from_string(&row.id)?,
            job_name: row.job_name,
            owner_user_id: UserId(row.owner_user_id),
            status: row.status.parse()?,
            progress_percent: row.progress_percent.clamp(0, 100) as u8,
            progress_message: row.progress_message,
            error_message: row.error_message,
            started_at: from_unix(row.started_at)?,
            ended_at: row.ended_at.map(from_unix).transpose()?,
        })
    }
}

#[async_trait]
impl JobRunRepository for SqliteJobRunRepository {
    async fn insert(&self, run: &JobRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_runs (
                id, job_name, owner_user_id, status, progress_percent,
                progress_message, error_message, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.as_str())
        .bind(&run.job_name)
        .bind(run.owner_user_id.0)
        .bind(run.status.as_str())
        .bind(run.progress_percent as i64)
        .bind(&run.progress_message)
        .bind(&run.error_message)
        .bind(run.started_at.timestamp())
        .bind(run.ended_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &JobRunId) -> Result<Option<JobRun>> {
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT id, job_name, owner_user_id, status, progress_percent,
                   progress_message, error_message, started_at, ended_at
            FROM job_runs
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(JobRun::try_from).transpose()
    }

    async fn update_progress(&self, id: &JobRunId, percent: u8, message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE job_runs SET
                progress_percent = MAX(progress_percent, ?),
                progress_message = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(percent.min(100) as i64)
        .bind(message)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn finalize(
        &self,
        id: &JobRunId,
        status: JobStatus,
        error_message: Option<&str>,
        ended_at: DateTime<Utc>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(SyncError::InvalidStateTransition {
                from: JobStatus::Running.as_str().to_string(),
                to: status.as_str().to_string(),
                reason: "A job run can only be finalized as completed or failed".to_string(),
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE job_runs SET
                status = ?,
                error_message = ?,
                ended_at = ?,
                progress_percent = CASE WHEN ? = 'completed' THEN 100 ELSE progress_percent END,
                progress_message = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(ended_at.timestamp())
        .bind(status.as_str())
        .bind(match status {
            JobStatus::Completed => "Completed",
            _ => "Failed",
        })
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_owner(&self, owner: UserId, limit: u32) -> Result<Vec<JobRun>> {
        let rows = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT id, job_name, owner_user_id, status, progress_percent,
                   progress_message, error_message, started_at, ended_at
            FROM job_runs
            WHERE owner_user_id = ?
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(owner.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter()
            .map(JobRun::try_from)
            .collect::<Result<Vec<_>>>()
    }
}

// ============================================================================
// Schedules
// ============================================================================

/// Repository trait for sync schedule persistence
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Insert a schedule and return its row ID
    async fn insert(&self, schedule: &SyncSchedule) -> Result<i64>;

    /// All schedule rows, in insertion order
    async fn list_all(&self) -> Result<Vec<SyncSchedule>>;

    /// Schedules due at `now`, in insertion order
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<SyncSchedule>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|schedule| schedule.is_due(now))
            .collect())
    }

    /// Record that a schedule ran
    async fn update_last_run(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Enable or disable a schedule
    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()>;
}

/// SQLite implementation of ScheduleRepository
pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    /// Create a new SQLite schedule repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn touch(&self, sql: &str, id: i64, value: i64) -> Result<()> {
        let result = sqlx::query(sql)
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::Database(format!("Schedule {} not found", id)));
        }

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct ScheduleRow {
    id: i64,
    user_id: i64,
    source_id: i64,
    source_type: String,
    media_type: String,
    frequency: String,
    last_run_at: Option<i64>,
    enabled: bool,
}

impl TryFrom<ScheduleRow> for SyncSchedule {
    type Error = SyncError;

    fn try_from(row: ScheduleRow) -> Result<Self> {
        let frequency: Frequency = row.frequency.parse()?;

        Ok(SyncSchedule {
            id: Some(row.id),
            user_id: UserId(row.user_id),
            source_id: SourceId(row.source_id),
            source_type: row.source_type.parse()?,
            media_type: row.media_type,
            frequency,
            last_run_at: row.last_run_at.map(from_unix).transpose()?,
            enabled: row.enabled,
        })
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn insert(&self, schedule: &SyncSchedule) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_schedules (
                user_id, source_id, source_type, media_type, frequency, last_run_at, enabled
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(schedule.user_id.0)
        .bind(schedule.source_id.0)
        .bind(schedule.source_type.as_str())
        .bind(&schedule.media_type)
        .bind(schedule.frequency.as_str())
        .bind(schedule.last_run_at.map(|t| t.timestamp()))
        .bind(schedule.enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn list_all(&self) -> Result<Vec<SyncSchedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT id, user_id, source_id, source_type, media_type, frequency,
                   last_run_at, enabled
            FROM sync_schedules
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter()
            .map(SyncSchedule::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn update_last_run(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.touch(
            "UPDATE sync_schedules SET last_run_at = ? WHERE id = ?",
            id,
            at.timestamp(),
        )
        .await
    }

    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        self.touch(
            "UPDATE sync_schedules SET enabled = ? WHERE id = ?",
            id,
            enabled as i64,
        )
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================
