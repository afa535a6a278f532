//! In-memory collaborators that count their calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use briefwire_providers::{
    CompletionClient, EmbeddingClient, ModerationClient, ModerationVerdict, PageRenderer, Services,
    SpeechSynthesizer,
};
use briefwire_resilience::Sleeper;
use briefwire_shared::{AppConfig, BriefwireError, Result, RunDate, SourceEntry};

use crate::phases::{Guards, Pacer, PhaseContext, PhaseEnv};
use crate::prompts;
use crate::sequencer::SilentProgress;

// ---------------------------------------------------------------------------
// Sleepers
// ---------------------------------------------------------------------------

pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn total(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

fn network(what: &str) -> BriefwireError {
    BriefwireError::Network(format!("{what}: connection reset"))
}

#[derive(Default)]
pub struct FakeRenderer {
    pub calls: AtomicUsize,
    failing: Mutex<Vec<String>>,
    panic: AtomicBool,
}

impl FakeRenderer {
    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().push(url.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn panic_on_render(&self) {
        self.panic.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic.load(Ordering::SeqCst) {
            panic!("renderer crashed on {url}");
        }
        if self.failing.lock().unwrap().iter().any(|u| u == url) {
            return Err(network(url));
        }
        Ok(format!("Headlines from {url}"))
    }
}

/// Answers each prompt kind with a canned, valid response.
#[derive(Default)]
pub struct FakeCompletion {
    pub calls: AtomicUsize,
    fail_all: AtomicBool,
    page_overrides: Mutex<HashMap<String, String>>,
    script_override: Mutex<Option<String>>,
}

impl FakeCompletion {
    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    /// Answer extraction prompts for `page_url` with `response`.
    pub fn override_for(&self, page_url: &str, response: &str) {
        self.page_overrides
            .lock()
            .unwrap()
            .insert(page_url.to_string(), response.to_string());
    }

    pub fn override_script(&self, response: &str) {
        *self.script_override.lock().unwrap() = Some(response.to_string());
    }

    pub fn clear_script_override(&self) {
        *self.script_override.lock().unwrap() = None;
    }

    fn extraction(&self, prompt: &str) -> String {
        let page = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Page URL: "))
            .unwrap_or_default()
            .to_string();
        if let Some(response) = self.page_overrides.lock().unwrap().get(&page) {
            return response.clone();
        }
        format!(
            r#"```json
[
  {{"title": "Lead story", "description": "Big news", "url": "{page}story-1", "source": "feed", "relevanceScore": 0.9, "tags": ["llm"]}},
  {{"title": "Minor story", "description": "Small news", "url": "{page}story-2", "source": "feed", "relevanceScore": 0.4}},
  {{"title": "Shared story", "description": "Everyone covers it", "url": "https://shared.test/story", "source": "feed", "relevanceScore": 0.6}}
]
```"#
        )
    }
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(&self, prompt: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(BriefwireError::Provider {
                status: 503,
                message: "unavailable".into(),
            });
        }

        let response = if prompt.starts_with(prompts::EXTRACTION_HEADER) {
            self.extraction(prompt)
        } else if prompt.starts_with(prompts::SUMMARY_HEADER) {
            "A short summary.".to_string()
        } else if prompt.starts_with(prompts::TAGS_HEADER) {
            r#"["Research", "weather"]"#.to_string()
        } else if prompt.starts_with(prompts::SCRIPT_HEADER) {
            match self.script_override.lock().unwrap().clone() {
                Some(response) => response,
                None => r#"{"lines": [
                    {"speaker": "Ana", "text": "Welcome to the briefing."},
                    {"speaker": "Ben", "text": "Lots of model news today."}
                ]}"#
                .to_string(),
            }
        } else {
            return Ok(None);
        };
        Ok(Some(response))
    }
}

type ModerationFn = dyn Fn(&str) -> Result<ModerationVerdict> + Send + Sync;

#[derive(Default)]
pub struct FakeModeration {
    pub calls: AtomicUsize,
    respond: Mutex<Option<Arc<ModerationFn>>>,
}

impl FakeModeration {
    pub fn set(&self, f: impl Fn(&str) -> Result<ModerationVerdict> + Send + Sync + 'static) {
        *self.respond.lock().unwrap() = Some(Arc::new(f));
    }
}

#[async_trait]
impl ModerationClient for FakeModeration {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let respond = self.respond.lock().unwrap().clone();
        match respond {
            Some(f) => f(text),
            None => Ok(ModerationVerdict::default()),
        }
    }
}

pub struct FakeEmbedding {
    pub calls: AtomicUsize,
    pub max_batch: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    fail_marker: Mutex<Option<String>>,
}

impl Default for FakeEmbedding {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            max_batch: AtomicUsize::new(16),
            batch_sizes: Mutex::new(Vec::new()),
            fail_marker: Mutex::new(None),
        }
    }
}

impl FakeEmbedding {
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    /// Reject any batch containing a text that includes `marker`.
    pub fn fail_when_contains(&self, marker: &str) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbedding {
    fn max_batch(&self) -> usize {
        self.max_batch.load(Ordering::SeqCst)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(texts.len());
        if let Some(marker) = self.fail_marker.lock().unwrap().as_deref() {
            if texts.iter().any(|t| t.contains(marker)) {
                return Err(BriefwireError::validation("rejected input"));
            }
        }
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, 1.0, 0.5])
            .collect())
    }
}

#[derive(Default)]
pub struct FakeSpeech {
    pub calls: AtomicUsize,
    fail_all: AtomicBool,
}

impl FakeSpeech {
    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, _text: &str, file_stem: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(BriefwireError::Provider {
                status: 400,
                message: "voice not available".into(),
            });
        }
        Ok(format!("audio/{file_stem}.mp3"))
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// A full set of fakes with happy-path defaults.
pub struct Fixture {
    pub renderer: Arc<FakeRenderer>,
    pub completion: Arc<FakeCompletion>,
    pub moderation: Arc<FakeModeration>,
    pub embedding: Arc<FakeEmbedding>,
    pub speech: Arc<FakeSpeech>,
}

impl Fixture {
    pub fn happy() -> Self {
        Self {
            renderer: Arc::default(),
            completion: Arc::default(),
            moderation: Arc::default(),
            embedding: Arc::default(),
            speech: Arc::default(),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            renderer: self.renderer.clone(),
            completion: self.completion.clone(),
            moderation: self.moderation.clone(),
            embedding: self.embedding.clone(),
            speech: self.speech.clone(),
        }
    }

    /// Phase context over these fakes with sleeping disabled.
    pub fn context(&self, config: &AppConfig) -> PhaseContext {
        self.paced_context(config, Arc::new(NoSleep))
    }

    /// Like [`Fixture::context`], but request pacing sleeps on `pacer`.
    pub fn paced_context(&self, config: &AppConfig, pacer: Arc<dyn Sleeper>) -> PhaseContext {
        let guards = Guards::with_sleeper(config, Arc::new(NoSleep)).unwrap();
        let delay = Duration::from_millis(config.pipeline.request_delay_ms);
        PhaseContext::new(config, self.services(), guards, Pacer::new(delay, pacer))
    }

    pub fn total_calls(&self) -> usize {
        [
            &self.renderer.calls,
            &self.completion.calls,
            &self.moderation.calls,
            &self.embedding.calls,
            &self.speech.calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.sources = vec![
        SourceEntry {
            name: "alpha".into(),
            url: "https://alpha.test/".into(),
        },
        SourceEntry {
            name: "beta".into(),
            url: "https://beta.test/".into(),
        },
    ];
    config
}

pub fn test_date() -> RunDate {
    "2024-06-10".parse().unwrap()
}

pub fn env_for(ctx: &PhaseContext, date: RunDate) -> PhaseEnv<'_> {
    PhaseEnv {
        ctx,
        date,
        progress: &SilentProgress,
    }
}
