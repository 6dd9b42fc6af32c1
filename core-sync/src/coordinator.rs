//! # Sync Orchestrator
//!
//! Runs due schedules and manual requests, one job run per (source, media
//! type) pair.
//!
//! ## Overview
//!
//! The `SyncOrchestrator` ties the sync components together:
//! - Reads due schedules from `ScheduleRepository`
//! - Resolves the source's adapter through the `AdapterRegistry`
//! - Dispatches catalog media types to the `BatchUpsertProcessor` and
//!   history to the `HistoryReconciler`
//! - Records the job run lifecycle through the `ProgressReporter`
//!
//! ## Workflow
//!
//! ### Scheduled Runs
//! 1. Load every schedule that is due at the current clock time
//! 2. Run each entry with `run_one`, in schedule order
//! 3. Log and collect failures; one failing entry never stops the others
//! 4. Stop launching entries once the cancellation token fires
//!
//! With `parallel_sources` enabled, entries are grouped by source and the
//! groups run concurrently. Entries of the same source stay sequential.
//!
//! ### A Single Run
//! 1. Start a `JobRun` (status `running`) and announce it
//! 2. Load the source configuration and connect its adapter
//! 3. Parse the media type token and dispatch
//! 4. Finalize the run as `completed` or `failed` with the error text
//! 5. Stamp the schedule's last run time (scheduled runs only)
//!
//! Every run is bounded by `SyncConfig::run_timeout`. When the deadline
//! passes the run's own cancellation token fires, so the sync stops at the
//! next batch boundary or in-flight adapter call rather than in the middle
//! of a batch. Errors are not retried here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{AdapterRegistry, SyncConfig, SyncOrchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(pool: sqlx::SqlitePool, registry: AdapterRegistry) -> core_sync::Result<()> {
//! let orchestrator = SyncOrchestrator::new(SyncConfig::default(), registry, pool, None);
//! let summary = orchestrator.run_due_schedules(&CancellationToken::new()).await?;
//! println!("{}/{} schedules succeeded", summary.succeeded, summary.attempted);
//! # Ok(())
//! # }
//! ```

use crate::{
    cancel::adapter_call,
    history::{HistoryReconciler, HistorySyncOutcome},
    job::{JobRun, JobRunId, JobStatus},
    media_type::SyncMediaType,
    progress::ProgressReporter,
    registry::AdapterRegistry,
    repository::{JobRunRepository, ScheduleRepository, SqliteJobRunRepository, SqliteScheduleRepository},
    schedule::{Frequency, SyncSchedule},
    upsert::{BatchUpsertProcessor, UpsertStats},
    Result, SyncError,
};
use bridge_traits::time::{Clock, SystemClock};
use core_library::models::{SourceId, UserId};
use core_library::repositories::{
    MediaItemRepository, PlaybackRepository, SqliteMediaItemRepository, SqlitePlaybackRepository,
};
use core_runtime::events::EventBus;
use futures::future::join_all;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound for a single job run
    pub run_timeout: Duration,

    /// Run schedules of different sources concurrently
    pub parallel_sources: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(30 * 60),
            parallel_sources: false,
        }
    }
}

/// Storage the orchestrator works against
#[derive(Clone)]
pub struct SyncRepositories {
    pub items: Arc<dyn MediaItemRepository>,
    pub playback: Arc<dyn PlaybackRepository>,
    pub jobs: Arc<dyn JobRunRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
}

impl SyncRepositories {
    /// SQLite repositories sharing one pool
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            items: Arc::new(SqliteMediaItemRepository::new(pool.clone())),
            playback: Arc::new(SqlitePlaybackRepository::new(pool.clone())),
            jobs: Arc::new(SqliteJobRunRepository::new(pool.clone())),
            schedules: Arc::new(SqliteScheduleRepository::new(pool)),
        }
    }
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Catalog(UpsertStats),
    History(HistorySyncOutcome),
}

/// Result of a successful job run
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: JobRunId,
    pub source_id: SourceId,
    pub media_type: SyncMediaType,
    pub outcome: SyncOutcome,
}

/// A schedule entry that failed during `run_due_schedules`
#[derive(Debug, Clone)]
pub struct ScheduleFailure {
    pub schedule_id: Option<i64>,
    pub source_id: SourceId,
    pub media_type: String,
    pub error: String,
}

/// Result of one pass over the due schedules
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Entries that were started
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<ScheduleFailure>,
    /// Due entries left unstarted because of cancellation
    pub not_started: usize,
}

impl RunSummary {
    fn record(&mut self, entry: &SyncSchedule, result: &Result<JobReport>) {
        self.attempted += 1;
        match result {
            Ok(_) => self.succeeded += 1,
            Err(e) => self.failures.push(ScheduleFailure {
                schedule_id: entry.id,
                source_id: entry.source_id,
                media_type: entry.media_type.clone(),
                error: e.to_string(),
            }),
        }
    }
}

/// Schedules and runs sync jobs
pub struct SyncOrchestrator {
    config: SyncConfig,
    registry: AdapterRegistry,
    schedules: Arc<dyn ScheduleRepository>,
    jobs: Arc<dyn JobRunRepository>,
    reporter: Arc<ProgressReporter>,
    processor: Arc<BatchUpsertProcessor>,
    history: HistoryReconciler,
    clock: Arc<dyn Clock>,
}

impl SyncOrchestrator {
    /// Create an orchestrator backed by SQLite and the system clock
    pub fn new(
        config: SyncConfig,
        registry: AdapterRegistry,
        pool: SqlitePool,
        event_bus: Option<EventBus>,
    ) -> Self {
        Self::with_parts(
            config,
            registry,
            SyncRepositories::sqlite(pool),
            event_bus,
            Arc::new(SystemClock),
        )
    }

    /// Create an orchestrator from explicit repositories and clock
    pub fn with_parts(
        config: SyncConfig,
        registry: AdapterRegistry,
        repositories: SyncRepositories,
        event_bus: Option<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut reporter = ProgressReporter::new(Arc::clone(&repositories.jobs), Arc::clone(&clock));
        if let Some(bus) = event_bus {
            reporter = reporter.with_event_bus(bus);
        }
        let reporter = Arc::new(reporter);

        let processor = Arc::new(BatchUpsertProcessor::new(
            Arc::clone(&repositories.items),
            Arc::clone(&reporter),
        ));
        let history = HistoryReconciler::new(
            Arc::clone(&repositories.playback),
            Arc::clone(&processor),
            Arc::clone(&reporter),
        );

        Self {
            config,
            registry,
            schedules: repositories.schedules,
            jobs: repositories.jobs,
            reporter,
            processor,
            history,
            clock,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Persist a new schedule
    pub async fn add_schedule(&self, schedule: &SyncSchedule) -> Result<i64> {
        self.schedules.insert(schedule).await
    }

    pub async fn list_schedules(&self) -> Result<Vec<SyncSchedule>> {
        self.schedules.list_all().await
    }

    pub async fn set_schedule_enabled(&self, schedule_id: i64, enabled: bool) -> Result<()> {
        self.schedules.set_enabled(schedule_id, enabled).await
    }

    pub async fn get_job_run(&self, job_id: &JobRunId) -> Result<JobRun> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Most recent job runs owned by a user
    pub async fn list_job_runs(&self, owner: UserId, limit: u32) -> Result<Vec<JobRun>> {
        self.jobs.find_by_owner(owner, limit).await
    }

    /// Run every schedule due at the current time
    ///
    /// Failures of individual entries are logged and collected in the
    /// summary. Only failing to load the schedules is an error.
    #[instrument(skip(self, cancel))]
    pub async fn run_due_schedules(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        let due = self.schedules.find_due(self.clock.now()).await?;
        info!("{} sync schedules due", due.len());

        let mut summary = RunSummary::default();

        if self.config.parallel_sources {
            let groups = group_by_source(due);
            let results = join_all(
                groups
                    .into_iter()
                    .map(|entries| self.run_sequence(entries, cancel)),
            )
            .await;

            for (results, not_started) in results {
                for (entry, result) in &results {
                    summary.record(entry, result);
                }
                summary.not_started += not_started;
            }
        } else {
            let (results, not_started) = self.run_sequence(due, cancel).await;
            for (entry, result) in &results {
                summary.record(entry, result);
            }
            summary.not_started = not_started;
        }

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failures.len(),
            not_started = summary.not_started,
            "Finished due schedules"
        );

        Ok(summary)
    }

    /// Run entries one after the other until cancelled
    async fn run_sequence(
        &self,
        entries: Vec<SyncSchedule>,
        cancel: &CancellationToken,
    ) -> (Vec<(SyncSchedule, Result<JobReport>)>, usize) {
        let total = entries.len();
        let mut results = Vec::with_capacity(total);

        for entry in entries {
            if cancel.is_cancelled() {
                warn!("Cancelled, not starting remaining schedules");
                break;
            }

            let result = self.run_one(&entry, cancel).await;
            if let Err(e) = &result {
                warn!(
                    schedule_id = ?entry.id,
                    source_id = %entry.source_id,
                    media_type = %entry.media_type,
                    error = %e,
                    "Scheduled sync failed"
                );
            }
            results.push((entry, result));
        }

        let not_started = total - results.len();
        (results, not_started)
    }

    /// Run a sync for a source without a schedule
    ///
    /// The source's client family is detected by probing the registered
    /// factories in registration order.
    #[instrument(skip(self, user_id, source_id, cancel), fields(user_id = %user_id, source_id = %source_id))]
    pub async fn run_manual(
        &self,
        user_id: UserId,
        source_id: SourceId,
        media_type: &str,
        cancel: &CancellationToken,
    ) -> Result<JobReport> {
        let config = self.registry.detect(source_id).await?;
        info!(source_type = %config.source_type, "Starting manual {} sync", media_type);

        let entry = SyncSchedule::new(
            user_id,
            source_id,
            config.source_type,
            media_type,
            Frequency::Manual,
        );
        self.run_one(&entry, cancel).await
    }

    /// Run one schedule entry as a job run
    ///
    /// The job run is finalized whatever happens; the error that failed it
    /// is returned.
    #[instrument(
        skip(self, entry, cancel),
        fields(schedule_id = ?entry.id, source_id = %entry.source_id, media_type = %entry.media_type)
    )]
    pub async fn run_one(&self, entry: &SyncSchedule, cancel: &CancellationToken) -> Result<JobReport> {
        let run = JobRun::start(
            format!("sync:{}:{}", entry.source_id, entry.media_type.to_lowercase()),
            entry.user_id,
            self.clock.now(),
        );
        let job_id = run.id;
        self.reporter
            .begin(&run, entry.source_id, &entry.media_type)
            .await?;

        let result = self.execute_with_deadline(entry, &job_id, cancel).await;

        let finalized = match &result {
            Ok(_) => {
                info!("Sync job {} completed successfully", job_id);
                self.reporter.complete(&job_id, JobStatus::Completed, None).await
            }
            Err(e) => {
                error!("Sync job {} failed: {}", job_id, e);
                self.reporter
                    .complete(&job_id, JobStatus::Failed, Some(&e.to_string()))
                    .await
            }
        };
        if let Err(e) = finalized {
            warn!("Could not finalize job run {}: {}", job_id, e);
        }

        if let Some(schedule_id) = entry.id {
            if let Err(e) = self.schedules.update_last_run(schedule_id, self.clock.now()).await {
                warn!(schedule_id, error = %e, "Could not record schedule run time");
            }
        }

        let (media_type, outcome) = result?;
        Ok(JobReport {
            job_id,
            source_id: entry.source_id,
            media_type,
            outcome,
        })
    }

    /// Drive [`Self::execute`] under the run timeout
    ///
    /// A sync that still finishes after the deadline fired keeps its result.
    async fn execute_with_deadline(
        &self,
        entry: &SyncSchedule,
        job_id: &JobRunId,
        cancel: &CancellationToken,
    ) -> Result<(SyncMediaType, SyncOutcome)> {
        let run_cancel = cancel.child_token();
        let execution = self.execute(entry, job_id, &run_cancel);
        tokio::pin!(execution);
        let deadline = tokio::time::sleep(self.config.run_timeout);
        tokio::pin!(deadline);

        tokio::select! {
            biased;
            result = &mut execution => return result,
            _ = &mut deadline => {}
        }

        error!(
            "Sync job {} timed out after {:?}, stopping at the next batch boundary",
            job_id, self.config.run_timeout
        );
        run_cancel.cancel();

        match execution.await {
            Err(SyncError::Cancelled) if !cancel.is_cancelled() => {
                Err(SyncError::Timeout(self.config.run_timeout))
            }
            other => other,
        }
    }

    async fn execute(
        &self,
        entry: &SyncSchedule,
        job_id: &JobRunId,
        cancel: &CancellationToken,
    ) -> Result<(SyncMediaType, SyncOutcome)> {
        let factory = self.registry.factory_for(entry.source_type)?;
        let config = adapter_call(cancel, factory.load_config(entry.source_id))
            .await?
            .ok_or(SyncError::SourceNotFound(entry.source_id))?;
        let source = adapter_call(cancel, factory.connect(config)).await?;

        let media_type: SyncMediaType = entry.media_type.parse()?;

        let outcome = match media_type {
            SyncMediaType::History => SyncOutcome::History(
                self.history
                    .sync_history(source.as_ref(), entry.source_id, entry.user_id, job_id, cancel)
                    .await?,
            ),
            catalog => SyncOutcome::Catalog(
                self.processor
                    .sync_media_type(source.as_ref(), catalog, entry.source_id, job_id, cancel)
                    .await?,
            ),
        };

        Ok((media_type, outcome))
    }
}

/// Split entries into per-source groups, keeping first-seen source order
fn group_by_source(entries: Vec<SyncSchedule>) -> Vec<Vec<SyncSchedule>> {
    let mut groups: Vec<(SourceId, Vec<SyncSchedule>)> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|(source_id, _)| *source_id == entry.source_id) {
            Some((_, group)) => group.push(entry),
            None => groups.push((entry.source_id, vec![entry])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}
