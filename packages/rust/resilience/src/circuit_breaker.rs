//! Circuit breaker guarding one class of external calls.
//!
//! ```text
//!   Closed --(failure_threshold consecutive failures)--> Open
//!   Open   --(first call after reset_timeout)----------> HalfOpen
//!   HalfOpen --(probe succeeds)------------------------> Closed
//!   HalfOpen --(probe fails | probe budget spent)------> Open
//! ```
//!
//! State lives behind a mutex that is never held across an `.await`, so the
//! wrapped call itself runs unlocked.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use briefwire_shared::{BriefwireError, CircuitBreakerSettings, Result};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic time source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock implementation.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Config and state
// ---------------------------------------------------------------------------

/// Thresholds for a breaker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(60_000),
            half_open_max_attempts: 1,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(settings.reset_timeout_ms),
            half_open_max_attempts: settings.half_open_max_attempts.max(1),
        }
    }
}

/// Breaker mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<Instant>,
    pub half_open_attempts: u32,
}

impl CircuitBreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            half_open_attempts: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

/// Stateful guard that stops calling a failing dependency until it cools down.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<CircuitBreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            state: Mutex::new(CircuitBreakerState::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> CircuitBreakerState {
        *self.lock()
    }

    /// Force the breaker closed and zero its counters.
    pub fn reset(&self) {
        *self.lock() = CircuitBreakerState::closed();
        info!(breaker = %self.name, "circuit breaker manually reset");
    }

    /// Run `op` if the breaker admits it, recording the outcome.
    ///
    /// A rejected call returns [`BriefwireError::CircuitOpen`] without
    /// invoking `op`.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;
        let result = op().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(e) => self.record_failure(e),
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open_error(&self) -> BriefwireError {
        BriefwireError::CircuitOpen {
            breaker: self.name.clone(),
        }
    }

    fn admit(&self) -> Result<()> {
        let now = self.clock.now();
        let mut s = self.lock();

        match s.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let cooled_down = s
                    .last_failure_at
                    .is_none_or(|at| now.saturating_duration_since(at) >= self.config.reset_timeout);
                if !cooled_down {
                    debug!(breaker = %self.name, "rejecting call while open");
                    return Err(self.open_error());
                }
                s.state = CircuitState::HalfOpen;
                s.half_open_attempts = 0;
                info!(breaker = %self.name, "circuit breaker half-open, probing");
                self.admit_probe(&mut s, now)
            }
            CircuitState::HalfOpen => self.admit_probe(&mut s, now),
        }
    }

    fn admit_probe(&self, s: &mut CircuitBreakerState, now: Instant) -> Result<()> {
        if s.half_open_attempts >= self.config.half_open_max_attempts {
            s.state = CircuitState::Open;
            s.last_failure_at = Some(now);
            warn!(breaker = %self.name, "probe budget spent, circuit breaker re-opened");
            return Err(self.open_error());
        }
        s.half_open_attempts += 1;
        Ok(())
    }

    fn record_success(&self) {
        let mut s = self.lock();
        if s.state != CircuitState::Closed {
            info!(breaker = %self.name, "probe succeeded, circuit breaker closed");
        }
        s.state = CircuitState::Closed;
        s.failure_count = 0;
        s.half_open_attempts = 0;
    }

    fn record_failure(&self, err: &BriefwireError) {
        let now = self.clock.now();
        let mut s = self.lock();
        s.failure_count += 1;
        s.last_failure_at = Some(now);

        match s.state {
            CircuitState::HalfOpen => {
                s.state = CircuitState::Open;
                warn!(breaker = %self.name, error = %err, "probe failed, circuit breaker re-opened");
            }
            CircuitState::Closed if s.failure_count >= self.config.failure_threshold => {
                s.state = CircuitState::Open;
                warn!(
                    breaker = %self.name,
                    failures = s.failure_count,
                    error = %err,
                    "circuit breaker opened"
                );
            }
            CircuitState::Closed | CircuitState::Open => {
                debug!(breaker = %self.name, failures = s.failure_count, "call failed");
            }
        }
    }
}
