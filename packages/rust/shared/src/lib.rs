//! Shared types, error model, and configuration for briefwire.
//!
//! This crate is the foundation depended on by all other briefwire crates.
//! It provides:
//! - [`BriefwireError`]: the unified error type, and [`outcome`] helpers
//! - Domain types ([`Article`], [`PipelinePhase`], [`RunDate`], [`RunState`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod outcome;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CircuitBreakerSettings, DefaultsConfig, OpenAiConfig, PipelineSettings,
    RetrySettings, SourceEntry, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_api_key, validate_api_key,
};
pub use error::{BriefwireError, ResponseErrorCode, Result};
pub use outcome::{try_catch, try_catch_async};
pub use types::{
    Article, DialogueLine, KNOWN_TAGS, PipelinePhase, PodcastEpisode, RunDate, RunState,
    ScrapedItem, is_known_tag,
};
