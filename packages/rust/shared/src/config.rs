//! Application configuration for briefwire.
//!
//! User config lives at `~/.briefwire/briefwire.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BriefwireError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "briefwire.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".briefwire";

// ---------------------------------------------------------------------------
// Config structs (matching briefwire.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenAI-compatible provider settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Retry policy for external calls.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Circuit breaker thresholds (one breaker per collaborator).
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Phase pacing and limits.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Pages rendered by the scrape phase.
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding phase checkpoints.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// Directory receiving synthesized audio files.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,

    /// Checkpoint backend: "fs" or "libsql".
    #[serde(default = "default_checkpoint_backend")]
    pub checkpoint_backend: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            audio_dir: default_audio_dir(),
            checkpoint_backend: default_checkpoint_backend(),
        }
    }
}

fn default_checkpoint_dir() -> String {
    "var/checkpoints".into()
}
fn default_audio_dir() -> String {
    "var/audio".into()
}
fn default_checkpoint_backend() -> String {
    "fs".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for extraction, summaries, tags and scripts.
    #[serde(default = "default_completion_model")]
    pub completion_model: String,

    /// Model used for article embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Model used for text-to-speech.
    #[serde(default = "default_speech_model")]
    pub speech_model: String,

    /// Voice used for text-to-speech.
    #[serde(default = "default_speech_voice")]
    pub speech_voice: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            completion_model: default_completion_model(),
            embedding_model: default_embedding_model(),
            speech_model: default_speech_model(),
            speech_voice: default_speech_voice(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_completion_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_speech_model() -> String {
    "tts-1".into()
}
fn default_speech_voice() -> String {
    "alloy".into()
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

/// `[circuit_breaker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    #[serde(default = "default_half_open_max_attempts")]
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            half_open_max_attempts: default_half_open_max_attempts(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_reset_timeout_ms() -> u64 {
    60_000
}
fn default_half_open_max_attempts() -> u32 {
    1
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Fixed pause between external calls within a phase.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Deadline for a single external call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Texts per embedding request (capped by the provider limit).
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// How many top articles receive narrated audio.
    #[serde(default = "default_audio_top_n")]
    pub audio_top_n: usize,

    /// Minimum articles required to script a podcast episode.
    #[serde(default = "default_podcast_min_articles")]
    pub podcast_min_articles: usize,

    /// Minimum validated items a completion response must yield.
    #[serde(default = "default_min_valid_items")]
    pub min_valid_items: usize,

    /// Upper bound on articles kept after extraction.
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            embedding_batch_size: default_embedding_batch_size(),
            audio_top_n: default_audio_top_n(),
            podcast_min_articles: default_podcast_min_articles(),
            min_valid_items: default_min_valid_items(),
            max_articles: default_max_articles(),
        }
    }
}

fn default_request_delay_ms() -> u64 {
    500
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_embedding_batch_size() -> usize {
    100
}
fn default_audio_top_n() -> usize {
    5
}
fn default_podcast_min_articles() -> usize {
    3
}
fn default_min_valid_items() -> usize {
    1
}
fn default_max_articles() -> usize {
    50
}

/// `[[sources]]` entry: a page the scrape phase renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Short source label carried onto articles.
    pub name: String,
    /// Page URL.
    pub url: String,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.briefwire/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BriefwireError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.briefwire/briefwire.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BriefwireError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BriefwireError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BriefwireError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BriefwireError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BriefwireError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the provider API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(config).map(|_| ())
}

/// Read the provider API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openai.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(BriefwireError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
