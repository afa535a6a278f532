//! Fault-tolerance primitives for calls to flaky external services.
//!
//! This crate provides:
//! - [`retry`]: bounded exponential backoff with jitter
//! - [`circuit_breaker`]: Closed / Open / HalfOpen guard per collaborator
//! - [`timeout`]: per-call deadlines that surface as ordinary failures
//! - [`Guard`]: the three composed, as used by every pipeline phase

pub mod circuit_breaker;
pub mod guard;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitState, Clock, ManualClock,
    SystemClock,
};
pub use guard::Guard;
pub use retry::{
    JitterSource, RandomJitter, RetryConfig, RetryPolicy, Sleeper, TokioSleeper, backoff_delay,
    with_retry,
};
pub use timeout::with_timeout;
