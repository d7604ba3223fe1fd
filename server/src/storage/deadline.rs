use std::future::Future;
use std::time::Duration;

use super::error::{Result, StoreError};

/// Connect-only and read paths
pub const READ: Duration = Duration::from_secs(10);
/// Mutating and governance paths
pub const WRITE: Duration = Duration::from_secs(30);

/// Runs `fut` to completion or drops it once `limit` elapses
pub async fn within<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}
