//! Timeout defaults and async timeout helpers.

use std::future::Future;
use std::time::Duration;

use crate::error::{BitswarmError, Result};

/// Default timeout for connecting and other one-shot network operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between lag probes
pub const LAG_PROBE_INTERVAL: Duration = Duration::from_secs(4);

/// Run `future`, failing with [`BitswarmError::Timeout`] if it takes longer than `duration`.
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(BitswarmError::Timeout),
    }
}
