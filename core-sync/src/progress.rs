//! # Progress & Status Reporter
//!
//! Writes job run progress and final status, and mirrors both onto the event
//! bus.
//!
//! Finalization is terminal: progress reported afterwards is dropped with a
//! debug log, and a second `complete` is rejected with
//! [`SyncError::JobAlreadyFinalized`]. Percent is clamped to 100 and never
//! lowered, both in storage and in emitted events.

use crate::job::{JobRun, JobRunId, JobStatus};
use crate::repository::JobRunRepository;
use crate::{Result, SyncError};
use bridge_traits::time::Clock;
use core_library::models::SourceId;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Reports job run progress to storage and the event bus
pub struct ProgressReporter {
    jobs: Arc<dyn JobRunRepository>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    /// Highest percent emitted per running job
    high_water: Mutex<HashMap<JobRunId, u8>>,
}

impl ProgressReporter {
    pub fn new(jobs: Arc<dyn JobRunRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs,
            clock,
            event_bus: None,
            high_water: Mutex::new(HashMap::new()),
        }
    }

    /// Mirror progress onto an event bus
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Persist a freshly started run and announce it
    pub async fn begin(&self, run: &JobRun, source_id: SourceId, media_type: &str) -> Result<()> {
        self.jobs.insert(run).await?;
        self.record_high_water(&run.id, run.progress_percent);

        self.emit(SyncEvent::Started {
            job_id: run.id.to_string(),
            source_id: source_id.0,
            media_type: media_type.to_string(),
            owner_user_id: run.owner_user_id.0,
        });

        Ok(())
    }

    /// Record progress for a running job
    ///
    /// A no-op for finalized or unknown runs.
    pub async fn set_progress(&self, job_id: &JobRunId, percent: u8, message: &str) -> Result<()> {
        let percent = percent.min(100);

        if !self.jobs.update_progress(job_id, percent, message).await? {
            debug!(job_id = %job_id, percent, "Ignoring progress for finalized job run");
            return Ok(());
        }

        let effective = self.record_high_water(job_id, percent);
        debug!(job_id = %job_id, percent = effective, "{}", message);

        self.emit(SyncEvent::Progress {
            job_id: job_id.to_string(),
            percent: effective,
            message: message.to_string(),
        });

        Ok(())
    }

    /// Finalize a run
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidStateTransition`] when `status` is `Running`
    /// - [`SyncError::JobAlreadyFinalized`] when the run was already completed or failed
    /// - [`SyncError::JobNotFound`] when no such run exists
    pub async fn complete(
        &self,
        job_id: &JobRunId,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(SyncError::InvalidStateTransition {
                from: JobStatus::Running.as_str().to_string(),
                to: status.as_str().to_string(),
                reason: "complete() requires a terminal status".to_string(),
            });
        }

        let applied = self
            .jobs
            .finalize(job_id, status, error_message, self.clock.now())
            .await?;

        if !applied {
            return match self.jobs.find_by_id(job_id).await? {
                Some(_) => {
                    warn!(job_id = %job_id, "Job run already finalized");
                    Err(SyncError::JobAlreadyFinalized {
                        job_id: job_id.to_string(),
                    })
                }
                None => Err(SyncError::JobNotFound {
                    job_id: job_id.to_string(),
                }),
            };
        }

        if let Ok(mut high_water) = self.high_water.lock() {
            high_water.remove(job_id);
        }

        match status {
            JobStatus::Completed => {
                info!(job_id = %job_id, "Job run completed");
                self.emit(SyncEvent::Completed {
                    job_id: job_id.to_string(),
                });
            }
            _ => {
                let message = error_message.unwrap_or("unknown error").to_string();
                warn!(job_id = %job_id, error = %message, "Job run failed");
                self.emit(SyncEvent::Failed {
                    job_id: job_id.to_string(),
                    message,
                });
            }
        }

        Ok(())
    }

    /// Event bus the reporter publishes on, if any
    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_ref()
    }

    fn record_high_water(&self, job_id: &JobRunId, percent: u8) -> u8 {
        match self.high_water.lock() {
            Ok(mut high_water) => {
                let entry = high_water.entry(*job_id).or_insert(0);
                *entry = (*entry).max(percent);
                *entry
            }
            Err(_) => percent,
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is fine
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}
