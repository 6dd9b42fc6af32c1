//! Cancellation helpers shared by the upsert and history paths

use crate::{Result, SyncError};
use bridge_traits::BridgeError;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Race an adapter call against the cancellation token
///
/// The adapter future is dropped as soon as the token fires.
pub(crate) async fn adapter_call<T, F>(cancel: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, BridgeError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = call => result.map_err(SyncError::from),
    }
}

/// Fail with [`SyncError::Cancelled`] when the token has fired
pub(crate) fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}
