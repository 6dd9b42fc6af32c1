//! # Sync & Reconciliation Module
//!
//! Pulls catalog and playback history from external sources and reconciles
//! every record against the canonical catalog.
//!
//! ## Overview
//!
//! This module manages:
//! - Sync schedules and their due-ness
//! - Job runs with validated state transitions and monotonic progress
//! - Mapping source item IDs onto canonical items
//! - Batched, partial-failure tolerant upserts per media type
//! - Playback history reconciliation per user
//!
//! ## Components
//!
//! - **Job Runs** (`job`): Job run lifecycle (`running` → `completed` | `failed`)
//! - **Schedules** (`schedule`): Per-source, per-media-type sync schedules
//! - **Repository** (`repository`): Database persistence for job runs and schedules
//! - **Progress Reporter** (`progress`): Progress and final status, mirrored onto the event bus
//! - **Identity Resolver** (`identity`): Source mapping lookups and identity merge rules
//! - **Batch Upsert Processor** (`upsert`): Fetch, batch and reconcile catalog listings
//! - **History Reconciliation** (`history`): Playback records for the run's owner
//! - **Adapter Registry** (`registry`): Source factories by client family
//! - **Sync Orchestrator** (`coordinator`): Runs due schedules and manual requests

mod cancel;
mod capability;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod identity;
pub mod job;
pub mod media_type;
pub mod progress;
pub mod registry;
pub mod repository;
pub mod schedule;
pub mod upsert;

pub use coordinator::{
    JobReport, RunSummary, ScheduleFailure, SyncConfig, SyncOrchestrator, SyncOutcome,
    SyncRepositories,
};
pub use error::{Result, SyncError};
pub use history::{HistoryReconciler, HistoryStats, HistorySyncOutcome};
pub use identity::IdentityResolver;
pub use job::{JobRun, JobRunId, JobStatus};
pub use media_type::SyncMediaType;
pub use progress::ProgressReporter;
pub use registry::AdapterRegistry;
pub use repository::{
    JobRunRepository, ScheduleRepository, SqliteJobRunRepository, SqliteScheduleRepository,
};
pub use schedule::{Frequency, SyncSchedule};
pub use upsert::{BatchUpsertProcessor, ItemOutcome, UpsertStats};
