use bridge_traits::BridgeError;
use core_library::error::LibraryError;
use core_library::models::{MediaItemId, MediaKind, SourceId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Job run {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Job run {job_id} is already finalized")]
    JobAlreadyFinalized { job_id: String },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    #[error("Invalid sync frequency: {0}")]
    InvalidFrequency(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Source {source_id} does not support {capability}")]
    CapabilityMissing {
        source_id: SourceId,
        capability: String,
    },

    #[error("Item {item_id} is stored as {stored} but the source reports {incoming}")]
    KindMismatch {
        item_id: MediaItemId,
        stored: MediaKind,
        incoming: MediaKind,
    },

    #[error("No adapter registered for source type {0}")]
    AdapterNotRegistered(String),

    #[error("No registered adapter knows source {0}")]
    SourceNotFound(SourceId),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Source error: {0}")]
    Source(#[from] BridgeError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync timeout after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, SyncError>;
