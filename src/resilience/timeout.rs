use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Await `operation`, bounded by `limit` when one is set.
pub async fn with_timeout<F>(limit: Option<Duration>, operation: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation).await,
        None => Ok(operation.await),
    }
}
