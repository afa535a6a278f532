//! Bounded exponential-backoff retries.
//!
//! Attempt `i` (0-based) that fails with a retryable error is followed by a
//! pause of `min(base * 2^i, max) * jitter`, jitter drawn uniformly from
//! `[0.5, 1.0]`. No pause follows the final attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use briefwire_shared::{BriefwireError, Result, RetrySettings};

const JITTER_MIN: f64 = 0.5;
const JITTER_MAX: f64 = 1.0;

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Retry bounds. Construct through [`RetryConfig::new`] to validate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Validate and build a retry config.
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Result<Self> {
        if max_attempts < 1 {
            return Err(BriefwireError::config("retry.max_attempts must be at least 1"));
        }
        if base_delay_ms == 0 {
            return Err(BriefwireError::config("retry.base_delay_ms must be positive"));
        }
        if max_delay_ms < base_delay_ms {
            return Err(BriefwireError::config(
                "retry.max_delay_ms must be >= retry.base_delay_ms",
            ));
        }
        Ok(Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        })
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl TryFrom<&RetrySettings> for RetryConfig {
    type Error = BriefwireError;

    fn try_from(settings: &RetrySettings) -> Result<Self> {
        Self::new(
            settings.max_attempts,
            settings.base_delay_ms,
            settings.max_delay_ms,
        )
    }
}

/// Pause after failed attempt `attempt`, given a jitter draw in `[0.5, 1.0]`.
pub fn backoff_delay(attempt: u32, config: &RetryConfig, jitter: f64) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    let exponential = config.base_delay_ms.saturating_mul(factor);
    let capped = exponential.min(config.max_delay_ms);
    let jitter = jitter.clamp(JITTER_MIN, JITTER_MAX);
    Duration::from_millis((capped as f64 * jitter).round() as u64)
}

// ---------------------------------------------------------------------------
// Injectable sleep and randomness
// ---------------------------------------------------------------------------

/// Suspends the current task between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Source of jitter multipliers.
pub trait JitterSource: Send + Sync {
    /// A value in `[0.5, 1.0]`.
    fn draw(&self) -> f64;
}

/// Uniform jitter from the thread-local RNG.
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn draw(&self) -> f64 {
        rand::rng().random_range(JITTER_MIN..=JITTER_MAX)
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// A retry config bound to its sleep and jitter primitives.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(RandomJitter),
        }
    }

    /// Replace the sleep primitive (tests use a recording no-op).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the jitter source (tests use a constant).
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Invoke `op(attempt)` until it succeeds or the attempt budget runs out.
    ///
    /// Non-retryable errors are returned as-is after the first failure.
    /// Exhausting the budget yields [`BriefwireError::RetryExhausted`]
    /// wrapping the last error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let err = match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                debug!(attempt, code = err.code(), "non-retryable failure");
                return Err(err);
            }

            if attempt + 1 >= max_attempts {
                warn!(attempts = attempt + 1, error = %err, "retry budget exhausted");
                return Err(BriefwireError::RetryExhausted {
                    attempts: attempt + 1,
                    source: Box::new(err),
                });
            }

            let delay = backoff_delay(attempt, &self.config, self.jitter.draw());
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, backing off"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Retry `op` under `config` with the tokio timer and random jitter.
pub async fn with_retry<T, F, Fut>(op: F, config: RetryConfig) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryPolicy::new(config).run(op).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                slept: Mutex::new(Vec::new()),
            })
        }

        fn recorded(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    struct FixedJitter(f64);

    impl JitterSource for FixedJitter {
        fn draw(&self) -> f64 {
            self.0
        }
    }

    fn policy(config: RetryConfig, sleeper: Arc<RecordingSleeper>, jitter: f64) -> RetryPolicy {
        RetryPolicy::new(config)
            .with_sleeper(sleeper)
            .with_jitter(Arc::new(FixedJitter(jitter)))
    }

    fn transient() -> BriefwireError {
        BriefwireError::Network("connection reset".into())
    }

    #[test]
    fn config_validation() {
        assert!(RetryConfig::new(0, 100, 1_000).is_err());
        assert!(RetryConfig::new(3, 0, 1_000).is_err());
        assert!(RetryConfig::new(3, 500, 100).is_err());
        let ok = RetryConfig::new(1, 100, 100).expect("valid");
        assert_eq!(ok.max_attempts, 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = RetryConfig::new(10, 100, 1_000).unwrap();
        assert_eq!(backoff_delay(0, &config, 1.0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1, &config, 1.0), Duration::from_millis(200));
        assert_eq!(backoff_delay(3, &config, 1.0), Duration::from_millis(800));
        assert_eq!(backoff_delay(4, &config, 1.0), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(63, &config, 1.0), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(200, &config, 1.0), Duration::from_millis(1_000));
    }

    #[test]
    fn backoff_applies_and_clamps_jitter() {
        let config = RetryConfig::new(5, 100, 10_000).unwrap();
        assert_eq!(backoff_delay(2, &config, 0.5), Duration::from_millis(200));
        assert_eq!(backoff_delay(2, &config, 0.75), Duration::from_millis(300));
        assert_eq!(backoff_delay(2, &config, 0.1), Duration::from_millis(200));
        assert_eq!(backoff_delay(2, &config, 3.0), Duration::from_millis(400));
    }

    #[test]
    fn random_jitter_stays_in_range() {
        let jitter = RandomJitter;
        for _ in 0..1_000 {
            let j = jitter.draw();
            assert!((0.5..=1.0).contains(&j), "jitter {j} out of range");
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let policy = policy(RetryConfig::default(), sleeper.clone(), 1.0);
        let value = policy.run(|_| async { Ok::<_, BriefwireError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let sleeper = RecordingSleeper::new();
        let config = RetryConfig::new(4, 100, 10_000).unwrap();
        let policy = policy(config, sleeper.clone(), 1.0);

        let seen = Mutex::new(Vec::new());
        let result: Result<()> = policy
            .run(|attempt| {
                seen.lock().unwrap().push(attempt);
                async { Err(transient()) }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(
            sleeper.recorded(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
        match result {
            Err(BriefwireError::RetryExhausted { attempts, source }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*source, BriefwireError::Network(_)));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovers_midway() {
        let sleeper = RecordingSleeper::new();
        let config = RetryConfig::new(5, 10, 1_000).unwrap();
        let policy = policy(config, sleeper.clone(), 1.0);

        let value = policy
            .run(|attempt| async move {
                if attempt < 2 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(sleeper.recorded().len(), 2);
    }

    #[tokio::test]
    async fn single_attempt_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let config = RetryConfig::new(1, 10, 10).unwrap();
        let policy = policy(config, sleeper.clone(), 1.0);
        let result: Result<()> = policy.run(|_| async { Err(transient()) }).await;
        assert!(matches!(
            result,
            Err(BriefwireError::RetryExhausted { attempts: 1, .. })
        ));
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn non_retryable_error_fails_fast() {
        let sleeper = RecordingSleeper::new();
        let policy = policy(RetryConfig::default(), sleeper.clone(), 1.0);
        let calls = Mutex::new(0);
        let result: Result<()> = policy
            .run(|_| {
                *calls.lock().unwrap() += 1;
                async { Err(BriefwireError::config("missing key")) }
            })
            .await;

        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(matches!(result, Err(BriefwireError::Config { .. })));
        assert!(sleeper.recorded().is_empty());
    }
}
