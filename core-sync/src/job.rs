//! # Job Run State Machine
//!
//! Identity and status of one execution of a sync operation.
//!
//! ## Overview
//!
//! A [`JobRun`] is created in `Running` state when a sync starts. Progress
//! and the final status are written through
//! [`ProgressReporter`](crate::progress::ProgressReporter), which relies on
//! [`JobRunRepository`](crate::repository::JobRunRepository) to apply each
//! change only while the stored run is still running. The stored row is the
//! only copy that moves through the states below.
//!
//! ## State Machine
//!
//! ```text
//! Running → Completed
//!     ↓
//!     └───→ Failed
//! ```

use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use core_library::models::UserId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRunId(Uuid);

impl JobRunId {
    /// Create a new random job run ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job run ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidJobId(e.to_string()))?,
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for JobRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobRunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Run is in progress
    Running,
    /// Run finished successfully
    Completed,
    /// Run stopped with an error
    Failed,
}

impl JobStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Job Run Entity
// ============================================================================

/// One execution instance of a sync operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    /// Unique identifier for this run
    pub id: JobRunId,
    /// Descriptive name, `sync:<source>:<media type>`
    pub job_name: String,
    /// User the run belongs to
    pub owner_user_id: UserId,
    /// Current status
    pub status: JobStatus,
    /// Advisory completion percentage (0-100), never decreasing
    pub progress_percent: u8,
    /// Latest human-readable status
    pub progress_message: Option<String>,
    /// Error text when failed
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobRun {
    /// Create a new run in `Running` state
    pub fn start(job_name: impl Into<String>, owner_user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: JobRunId::new(),
            job_name: job_name.into(),
            owner_user_id,
            status: JobStatus::Running,
            progress_percent: 0,
            progress_message: Some("Starting".to_string()),
            error_message: None,
            started_at: now,
            ended_at: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
