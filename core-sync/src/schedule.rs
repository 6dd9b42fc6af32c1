//! # Sync Schedules
//!
//! Schedule rows say which media type of which source should be synced for a
//! user, and how often.
//!
//! Due-ness:
//! - `manual` schedules are never due automatically
//! - disabled schedules are never due
//! - a schedule that never ran is due
//! - otherwise due once `now - last_run_at >= frequency interval`

use crate::{Result, SyncError};
use chrono::{DateTime, Duration, Utc};
use core_library::models::{SourceId, SourceType, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How often a schedule should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    /// Fixed 30 days, not calendar months
    Monthly,
    /// Only run on explicit request
    Manual,
}

impl Frequency {
    /// Interval between automatic runs, `None` for manual schedules
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Frequency::Daily => Some(Duration::days(1)),
            Frequency::Weekly => Some(Duration::days(7)),
            Frequency::Monthly => Some(Duration::days(30)),
            Frequency::Manual => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Manual => "manual",
        }
    }
}

impl FromStr for Frequency {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "manual" => Ok(Frequency::Manual),
            _ => Err(SyncError::InvalidFrequency(s.to_string())),
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted sync schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSchedule {
    /// Row ID, `None` for manual runs that have no schedule row
    pub id: Option<i64>,
    pub user_id: UserId,
    pub source_id: SourceId,
    pub source_type: SourceType,
    /// Media type token as configured (e.g. "Movies", "episode")
    pub media_type: String,
    pub frequency: Frequency,
    pub last_run_at: Option<DateTime<Utc>>,
    pub enabled: bool,
}

impl SyncSchedule {
    pub fn new(
        user_id: UserId,
        source_id: SourceId,
        source_type: SourceType,
        media_type: impl Into<String>,
        frequency: Frequency,
    ) -> Self {
        Self {
            id: None,
            user_id,
            source_id,
            source_type,
            media_type: media_type.into(),
            frequency,
            last_run_at: None,
            enabled: true,
        }
    }

    /// Whether the schedule should run at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }

        let Some(interval) = self.frequency.interval() else {
            return false;
        };

        match self.last_run_at {
            None => true,
            Some(last) => now - last >= interval,
        }
    }
}
