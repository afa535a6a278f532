//! External collaborators used by the pipeline phases.
//!
//! Each collaborator is a small async trait so phases can be driven by the
//! HTTP implementations in production and by in-memory fakes in tests. The
//! handles travel together in [`Services`].

mod openai;
mod renderer;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use briefwire_shared::{AppConfig, Result, resolve_api_key};

pub use openai::{OpenAiClient, OpenAiSpeech};
pub use renderer::{HttpPageRenderer, extract_text};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Fetches a page and returns its readable text.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String>;
}

/// Free-form text completion. `Ok(None)` means the service answered
/// without content.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Option<String>>;
}

/// Per-category moderation flags for one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub flags: BTreeMap<String, bool>,
}

impl ModerationVerdict {
    /// Whether any category is flagged.
    pub fn flagged(&self) -> bool {
        self.flags.values().any(|&v| v)
    }

    /// Names of the flagged categories.
    pub fn flagged_categories(&self) -> Vec<&str> {
        self.flags
            .iter()
            .filter(|(_, v)| **v)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

#[async_trait]
pub trait ModerationClient: Send + Sync {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict>;
}

/// Text embeddings, one fixed-length vector per input, in input order.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Largest number of inputs accepted by one [`embed`](Self::embed) call.
    fn max_batch(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Text-to-speech. Returns the location of the produced audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, file_stem: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Collaborator handles injected into the sequencer.
#[derive(Clone)]
pub struct Services {
    pub renderer: Arc<dyn PageRenderer>,
    pub completion: Arc<dyn CompletionClient>,
    pub moderation: Arc<dyn ModerationClient>,
    pub embedding: Arc<dyn EmbeddingClient>,
    pub speech: Arc<dyn SpeechSynthesizer>,
}

impl Services {
    /// Build the HTTP-backed collaborators from configuration.
    ///
    /// Fails with a config error when the API key is not set.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        let timeout = Duration::from_secs(config.pipeline.request_timeout_secs);

        let openai = Arc::new(OpenAiClient::new(&config.openai, api_key, timeout)?);
        let speech = OpenAiSpeech::new(
            OpenAiClient::clone(&openai),
            PathBuf::from(&config.defaults.audio_dir),
        );

        Ok(Self {
            renderer: Arc::new(HttpPageRenderer::new(timeout)?),
            completion: openai.clone(),
            moderation: openai.clone(),
            embedding: openai,
            speech: Arc::new(speech),
        })
    }
}
