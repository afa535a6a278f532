//! Retry + circuit breaker + timeout, composed per collaborator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use briefwire_shared::Result;

use crate::circuit_breaker::CircuitBreaker;
use crate::retry::RetryPolicy;
use crate::timeout::with_timeout;

/// Protection applied to every call to one external collaborator.
///
/// Each retry attempt passes through the breaker, and each admitted call
/// runs under the per-call deadline. Once the breaker opens, the resulting
/// `CircuitOpen` error is non-retryable, so remaining attempts are skipped.
#[derive(Clone)]
pub struct Guard {
    name: String,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Guard {
    pub fn new(breaker: Arc<CircuitBreaker>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            name: breaker.name().to_string(),
            breaker,
            retry,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `op` under retry, breaker and deadline.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = &self.breaker;
        let name = self.name.as_str();
        let timeout = self.timeout;

        self.retry
            .run(|attempt| {
                debug!(guard = name, attempt, "calling collaborator");
                let fut = op();
                async move { breaker.execute(|| with_timeout(name, timeout, fut)).await }
            })
            .await
    }
}
