//! Clients for an OpenAI-compatible HTTP API.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use briefwire_shared::{BriefwireError, OpenAiConfig, ResponseErrorCode, Result};

use crate::{
    CompletionClient, EmbeddingClient, ModerationClient, ModerationVerdict, SpeechSynthesizer,
};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("briefwire/", env!("CARGO_PKG_VERSION"));

/// Largest input batch the embeddings endpoint accepts.
const EMBEDDING_MAX_BATCH: usize = 2048;

/// Longest error body carried into a `Provider` error.
const ERROR_BODY_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    #[serde(default)]
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    #[serde(default)]
    categories: std::collections::BTreeMap<String, bool>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Completion, moderation and embedding client for one API endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            BriefwireError::config(format!("invalid openai.base_url '{}': {e}", config.base_url))
        })?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| BriefwireError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
    }

    async fn send_json<R: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<R> {
        let response = send(self.post(path).json(&body), path).await?;
        response.json::<R>().await.map_err(|e| {
            BriefwireError::malformed(
                ResponseErrorCode::InvalidStructure,
                format!("{path}: unexpected response body: {e}"),
            )
        })
    }
}

/// Send a request, mapping transport failures to `Network` and non-success
/// statuses to `Provider`.
async fn send(request: RequestBuilder, what: &str) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| BriefwireError::Network(format!("{what}: {e}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(ERROR_BODY_CHARS).collect();
    Err(BriefwireError::Provider {
        status: status.as_u16(),
        message: format!("{what}: {}", message.trim()),
    })
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<Option<String>> {
        let body = json!({
            "model": self.config.completion_model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.2,
        });
        let response: ChatResponse = self.send_json("chat/completions", body).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        debug!(
            chars = content.as_ref().map_or(0, |c| c.len()),
            "completion received"
        );
        Ok(content)
    }
}

#[async_trait]
impl ModerationClient for OpenAiClient {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        let response: ModerationResponse =
            self.send_json("moderations", json!({ "input": text })).await?;
        let result = response.results.into_iter().next().ok_or_else(|| {
            BriefwireError::malformed(
                ResponseErrorCode::InvalidStructure,
                "moderations: empty results",
            )
        })?;
        Ok(ModerationVerdict {
            flags: result.categories,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    fn max_batch(&self) -> usize {
        EMBEDDING_MAX_BATCH
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > EMBEDDING_MAX_BATCH {
            return Err(BriefwireError::validation(format!(
                "embedding batch of {} exceeds limit {EMBEDDING_MAX_BATCH}",
                texts.len()
            )));
        }

        let body = json!({
            "model": self.config.embedding_model,
            "input": texts,
        });
        let mut response: EmbeddingResponse = self.send_json("embeddings", body).await?;

        if response.data.len() != texts.len() {
            return Err(BriefwireError::malformed(
                ResponseErrorCode::InvalidStructure,
                format!(
                    "embeddings: {} vectors for {} inputs",
                    response.data.len(),
                    texts.len()
                ),
            ));
        }
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ---------------------------------------------------------------------------
// OpenAiSpeech
// ---------------------------------------------------------------------------

/// Text-to-speech through `/audio/speech`, writing MP3 files to a directory.
#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    client: OpenAiClient,
    out_dir: PathBuf,
}

impl OpenAiSpeech {
    pub fn new(client: OpenAiClient, out_dir: PathBuf) -> Self {
        Self { client, out_dir }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, file_stem: &str) -> Result<String> {
        let body = json!({
            "model": self.client.config.speech_model,
            "voice": self.client.config.speech_voice,
            "input": text,
            "response_format": "mp3",
        });
        let response = send(self.client.post("audio/speech").json(&body), "audio/speech").await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BriefwireError::Network(format!("audio/speech: body read failed: {e}")))?;

        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| BriefwireError::io(&self.out_dir, e))?;
        let path = self.out_dir.join(format!("{file_stem}.mp3"));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| BriefwireError::io(&path, e))?;

        debug!(path = %path.display(), bytes = bytes.len(), "audio written");
        Ok(path.to_string_lossy().into_owned())
    }
}
