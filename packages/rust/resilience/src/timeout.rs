//! Per-call deadlines.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use briefwire_shared::{BriefwireError, Result};

/// Await `fut` for at most `limit`; an elapsed deadline becomes a
/// retryable [`BriefwireError::Timeout`].
pub async fn with_timeout<T, Fut>(operation: &str, limit: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            let after_ms = limit.as_millis() as u64;
            warn!(operation, after_ms, "external call timed out");
            Err(BriefwireError::Timeout {
                operation: operation.to_string(),
                after_ms,
            })
        }
    }
}
