//! Work performed by each pipeline phase.
//!
//! A phase takes the run snapshot left by its predecessor and returns the
//! next one. External calls go through the collaborator's [`Guard`] and are
//! paced by [`Pacer`]; the per-phase failure policy (skip, fall back, or
//! fail) lives in the phase itself.

mod collect;
mod enrich;
mod media;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use briefwire_providers::Services;
use briefwire_resilience::{
    CircuitBreaker, CircuitBreakerConfig, Guard, RetryConfig, RetryPolicy, Sleeper, TokioSleeper,
};
use briefwire_shared::{
    AppConfig, PipelinePhase, PipelineSettings, Result, RunDate, RunState, SourceEntry,
};
use briefwire_validator::ValidatorOptions;
use url::Url;

use crate::sequencer::ProgressReporter;

pub use collect::{gpt, scrape};
pub use enrich::{embed, enrich, moderate};
pub use media::{audio, finalize, podcast};

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Settings shared by every guard of a run.
#[derive(Clone)]
struct GuardFactory {
    retry: RetryConfig,
    breaker: CircuitBreakerConfig,
    timeout: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl GuardFactory {
    fn build(&self, name: &str) -> Guard {
        Guard::new(
            Arc::new(CircuitBreaker::new(name, self.breaker)),
            RetryPolicy::new(self.retry).with_sleeper(self.sleeper.clone()),
            self.timeout,
        )
    }
}

/// One retry + breaker + deadline bundle per collaborator.
///
/// Page rendering gets one guard per source host, so a failing site only
/// trips its own breaker.
#[derive(Clone)]
pub struct Guards {
    factory: GuardFactory,
    renderers: Arc<Mutex<HashMap<String, Guard>>>,
    pub completion: Guard,
    pub moderation: Guard,
    pub embedding: Guard,
    pub speech: Guard,
}

impl Guards {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    /// Build guards whose retry back-off uses `sleeper`.
    pub fn with_sleeper(config: &AppConfig, sleeper: Arc<dyn Sleeper>) -> Result<Self> {
        let factory = GuardFactory {
            retry: RetryConfig::try_from(&config.retry)?,
            breaker: CircuitBreakerConfig::from(&config.circuit_breaker),
            timeout: Duration::from_secs(config.pipeline.request_timeout_secs),
            sleeper,
        };

        Ok(Self {
            completion: factory.build("completion"),
            moderation: factory.build("moderation"),
            embedding: factory.build("embedding"),
            speech: factory.build("speech"),
            renderers: Arc::default(),
            factory,
        })
    }

    /// Renderer guard for the host of `url`, created on first use.
    pub fn renderer(&self, url: &str) -> Guard {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        let mut renderers = self.renderers.lock().unwrap_or_else(|e| e.into_inner());
        renderers
            .entry(host)
            .or_insert_with_key(|host| self.factory.build(&format!("renderer:{host}")))
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Pacer
// ---------------------------------------------------------------------------

/// Fixed delay between consecutive external calls within a phase.
#[derive(Clone)]
pub struct Pacer {
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Pacer {
    pub fn new(delay: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { delay, sleeper }
    }

    /// Wait before call number `index` (0-based); the first call goes
    /// immediately.
    pub async fn before(&self, index: usize) {
        if index > 0 && !self.delay.is_zero() {
            self.sleeper.sleep(self.delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// PhaseContext
// ---------------------------------------------------------------------------

/// Everything a phase needs besides the run snapshot.
#[derive(Clone)]
pub struct PhaseContext {
    pub services: Services,
    pub guards: Guards,
    pub pacer: Pacer,
    pub settings: PipelineSettings,
    pub sources: Vec<SourceEntry>,
}

impl PhaseContext {
    pub fn new(config: &AppConfig, services: Services, guards: Guards, pacer: Pacer) -> Self {
        Self {
            services,
            guards,
            pacer,
            settings: config.pipeline.clone(),
            sources: config.sources.clone(),
        }
    }

    /// Production context: tokio-timed pacing at `request_delay_ms`.
    pub fn from_config(config: &AppConfig, services: Services) -> Result<Self> {
        let guards = Guards::from_config(config)?;
        let pacer = Pacer::new(
            Duration::from_millis(config.pipeline.request_delay_ms),
            Arc::new(TokioSleeper),
        );
        Ok(Self::new(config, services, guards, pacer))
    }

    pub fn validator_options(&self) -> ValidatorOptions {
        ValidatorOptions {
            min_valid_items: self.settings.min_valid_items,
        }
    }
}

/// Per-run inputs handed to a phase.
pub struct PhaseEnv<'a> {
    pub ctx: &'a PhaseContext,
    pub date: RunDate,
    pub progress: &'a dyn ProgressReporter,
}

/// Run the work of `phase` on `state`.
pub async fn run_phase(
    phase: PipelinePhase,
    env: &PhaseEnv<'_>,
    state: RunState,
) -> Result<RunState> {
    match phase {
        PipelinePhase::Scrape => scrape(env, state).await,
        PipelinePhase::Gpt => gpt(env, state).await,
        PipelinePhase::Enrich => enrich(env, state).await,
        PipelinePhase::Moderate => moderate(env, state).await,
        PipelinePhase::Embed => embed(env, state).await,
        PipelinePhase::Audio => audio(env, state).await,
        PipelinePhase::Podcast => podcast(env, state).await,
        PipelinePhase::Final => finalize(env, state).await,
    }
}
