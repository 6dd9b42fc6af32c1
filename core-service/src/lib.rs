//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host's configuration and source adapters into the
//! sync engine. Hosts build a [`CoreConfig`], register one
//! [`SourceFactory`](bridge_traits::source::SourceFactory) per client family
//! in an [`AdapterRegistry`], and call [`CoreService::bootstrap`].
//!
//! ```rust,ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//! use core_sync::AdapterRegistry;
//!
//! # async fn example(registry: AdapterRegistry) -> core_service::Result<()> {
//! let config = CoreConfig::builder().database_path("catalog.db").build()?;
//! let core = CoreService::bootstrap(config, registry).await?;
//!
//! let scheduler = core.start_scheduler();
//! // ...
//! scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{Result, ServiceError};

use std::sync::Arc;

use core_library::db::{create_pool, DatabaseConfig};
use core_library::models::{SourceId, UserId};
use core_runtime::config::{CoreConfig, DatabaseLocation};
use core_runtime::events::{EventBus, EventStream};
use core_sync::{
    AdapterRegistry, JobReport, JobRun, JobRunId, RunSummary, SyncConfig, SyncOrchestrator,
    SyncSchedule,
};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

struct ServiceInner {
    config: CoreConfig,
    pool: SqlitePool,
    event_bus: EventBus,
    orchestrator: SyncOrchestrator,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Open the catalog database and assemble the sync engine.
    pub async fn bootstrap(config: CoreConfig, registry: AdapterRegistry) -> Result<Self> {
        config.validate()?;

        if registry.is_empty() {
            warn!("No source factories registered, every sync will fail");
        }

        let database = match &config.database {
            DatabaseLocation::File(path) => {
                DatabaseConfig::new(path.clone()).max_connections(config.max_connections)
            }
            DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
        };
        let pool = create_pool(database).await?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let orchestrator = SyncOrchestrator::new(
            sync_config(&config),
            registry,
            pool.clone(),
            Some(event_bus.clone()),
        );

        info!(
            source_types = ?orchestrator.registry().source_types(),
            "Core service initialized"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                pool,
                event_bus,
                orchestrator,
            }),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Database pool backing the catalog.
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.inner.orchestrator
    }

    /// Subscribe to sync and library events.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.inner.event_bus.subscribe())
    }

    /// Run every due schedule once.
    pub async fn run_due_schedules(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        Ok(self.inner.orchestrator.run_due_schedules(cancel).await?)
    }

    /// Sync one media type from a source right away.
    pub async fn run_manual_sync(
        &self,
        user_id: UserId,
        source_id: SourceId,
        media_type: &str,
        cancel: &CancellationToken,
    ) -> Result<JobReport> {
        Ok(self
            .inner
            .orchestrator
            .run_manual(user_id, source_id, media_type, cancel)
            .await?)
    }

    pub async fn add_schedule(&self, schedule: &SyncSchedule) -> Result<i64> {
        Ok(self.inner.orchestrator.add_schedule(schedule).await?)
    }

    pub async fn list_schedules(&self) -> Result<Vec<SyncSchedule>> {
        Ok(self.inner.orchestrator.list_schedules().await?)
    }

    pub async fn get_job_run(&self, job_id: &JobRunId) -> Result<JobRun> {
        Ok(self.inner.orchestrator.get_job_run(job_id).await?)
    }

    pub async fn list_job_runs(&self, owner: UserId, limit: u32) -> Result<Vec<JobRun>> {
        Ok(self.inner.orchestrator.list_job_runs(owner, limit).await?)
    }

    /// Poll for due schedules every `schedule_poll_interval` on a background
    /// task.
    ///
    /// The first poll happens immediately. Must be called from within a
    /// tokio runtime.
    pub fn start_scheduler(&self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let service = self.clone();
        let token = cancel.clone();
        let period = self.inner.config.schedule_poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match service.run_due_schedules(&token).await {
                            Ok(summary) if !summary.failures.is_empty() => {
                                warn!(
                                    failed = summary.failures.len(),
                                    attempted = summary.attempted,
                                    "Scheduled sync pass finished with failures"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => error!("Scheduled sync pass failed: {}", e),
                        }
                    }
                }
            }

            info!("Scheduler stopped");
        });

        info!(poll_interval_secs = period.as_secs(), "Scheduler started");
        SchedulerHandle { cancel, task }
    }
}

fn sync_config(config: &CoreConfig) -> SyncConfig {
    SyncConfig {
        run_timeout: config.sync_timeout,
        parallel_sources: config.parallel_source_sync,
    }
}

/// Handle to the background scheduler task.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancellation token shared with in-flight runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop polling, cancel in-flight runs and wait for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::source::{
        MediaSource, MovieSource, QueryOptions, SourceConfig, SourceFactory,
    };
    use core_library::models::{
        CanonicalMediaItem, MediaPayload, MovieDetails, SourceMapping, SourceType,
    };
    use core_runtime::events::{CoreEvent, SyncEvent};
    use core_sync::{Frequency, JobStatus};
    use std::time::Duration;

    struct Catalog;

    #[async_trait]
    impl MovieSource for Catalog {
        async fn get_movies(
            &self,
            _options: &QueryOptions,
        ) -> bridge_traits::error::Result<Vec<CanonicalMediaItem>> {
            Ok(vec![CanonicalMediaItem::new(MediaPayload::Movie(MovieDetails {
                title: "Arrival".to_string(),
                year: Some(2016),
                ..Default::default()
            }))
            .with_source(SourceMapping::new(SourceId(1), SourceType::Radarr, "42"))])
        }

        async fn get_movie_by_id(
            &self,
            _source_item_id: &str,
        ) -> bridge_traits::error::Result<Option<CanonicalMediaItem>> {
            Ok(None)
        }
    }

    impl MediaSource for Catalog {
        fn source_id(&self) -> SourceId {
            SourceId(1)
        }

        fn source_type(&self) -> SourceType {
            SourceType::Radarr
        }

        fn supports_movies(&self) -> bool {
            true
        }

        fn movies(&self) -> Option<&dyn MovieSource> {
            Some(self)
        }
    }

    struct CatalogFactory;

    #[async_trait]
    impl SourceFactory for CatalogFactory {
        fn source_type(&self) -> SourceType {
            SourceType::Radarr
        }

        async fn load_config(
            &self,
            source_id: SourceId,
        ) -> bridge_traits::error::Result<Option<SourceConfig>> {
            Ok((source_id == SourceId(1)).then(|| SourceConfig {
                source_id,
                source_type: SourceType::Radarr,
                display_name: "Radarr".to_string(),
                base_url: Some("http://localhost:7878".to_string()),
            }))
        }

        async fn connect(
            &self,
            _config: SourceConfig,
        ) -> bridge_traits::error::Result<Arc<dyn MediaSource>> {
            Ok(Arc::new(Catalog))
        }
    }

    async fn service(poll: Duration) -> CoreService {
        let config = CoreConfig::builder()
            .in_memory()
            .schedule_poll_interval(poll)
            .build()
            .unwrap();
        let registry = AdapterRegistry::new().register(Arc::new(CatalogFactory));
        CoreService::bootstrap(config, registry).await.unwrap()
    }

    #[tokio::test]
    async fn test_manual_sync_through_service() {
        let core = service(Duration::from_secs(60)).await;
        let mut events = core.subscribe_events();

        let report = core
            .run_manual_sync(UserId(1), SourceId(1), "movies", &CancellationToken::new())
            .await
            .unwrap();

        let run = core.get_job_run(&report.job_id).await.unwrap();
        assert_eq!(run.status, JobStatus::Completed);
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Started { .. })
        ));
    }

    #[tokio::test]
    async fn test_scheduler_runs_due_schedules_until_shutdown() {
        let core = service(Duration::from_millis(20)).await;
        core.add_schedule(&SyncSchedule::new(
            UserId(1),
            SourceId(1),
            SourceType::Radarr,
            "movies",
            Frequency::Daily,
        ))
        .await
        .unwrap();

        let scheduler = core.start_scheduler();
        assert!(scheduler.is_running());

        let mut ran = false;
        for _ in 0..100 {
            if !core.list_job_runs(UserId(1), 10).await.unwrap().is_empty() {
                ran = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ran);

        scheduler.shutdown().await;

        // Daily schedule stamped by the first pass is not picked up again
        let runs = core.list_job_runs(UserId(1), 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        let schedules = core.list_schedules().await.unwrap();
        assert!(schedules[0].last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_invalid_config() {
        let mut config = CoreConfig::builder().in_memory().build().unwrap();
        config.event_buffer_size = 0;

        let result = CoreService::bootstrap(config, AdapterRegistry::new()).await;
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }
}
