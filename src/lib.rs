//! Workspace umbrella crate.
//!
//! Re-exports the pieces a host application needs to run the media sync
//! engine without depending on each workspace crate individually.
//!
//! ```rust,ignore
//! use mediahub_workspace::{init_logging, AdapterRegistry, CoreConfig, CoreService};
//!
//! # async fn example(registry: AdapterRegistry) -> mediahub_workspace::ServiceResult<()> {
//! let config = CoreConfig::builder().database_path("catalog.db").build()?;
//! init_logging(config.logging.clone())?;
//!
//! let core = CoreService::bootstrap(config, registry).await?;
//! let scheduler = core.start_scheduler();
//! # scheduler.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub use bridge_traits::source::{
    HistorySource, MediaSource, MovieSource, MusicSource, QueryOptions, SeriesSource,
    SourceConfig, SourceFactory,
};
pub use core_library::models;
pub use core_runtime::config::{CoreConfig, CoreConfigBuilder, DatabaseLocation};
pub use core_runtime::events::{CoreEvent, EventStream, LibraryEvent, SyncEvent};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
pub use core_service::{CoreService, Result as ServiceResult, SchedulerHandle, ServiceError};
pub use core_sync::{
    AdapterRegistry, Frequency, JobReport, JobRun, JobRunId, JobStatus, RunSummary,
    SyncSchedule,
};
