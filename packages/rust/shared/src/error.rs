//! Error types for briefwire.
//!
//! Library crates use [`BriefwireError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Failure codes reported by the completion-response validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseErrorCode {
    /// The completion service returned nothing (or only whitespace).
    NullResponse,
    /// The text could not be parsed as JSON.
    ParseError,
    /// Parsed, but no array of items could be located.
    InvalidStructure,
    /// An array was found but no element passed validation.
    NoValidItems,
}

impl ResponseErrorCode {
    /// Stable wire token for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NullResponse => "null_response",
            Self::ParseError => "parse_error",
            Self::InvalidStructure => "invalid_structure",
            Self::NoValidItems => "no_valid_items",
        }
    }
}

impl fmt::Display for ResponseErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for all briefwire operations.
#[derive(Debug, thiserror::Error)]
pub enum BriefwireError {
    /// Configuration loading or validation error (never retried).
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// An external service answered with a non-success status.
    #[error("provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    /// The guarding circuit breaker rejected the call.
    #[error("circuit breaker is open: {breaker}")]
    CircuitOpen { breaker: String },

    /// All retry attempts failed; wraps the last error.
    #[error("gave up after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<BriefwireError>,
    },

    /// The completion service produced an unusable response.
    #[error("malformed response ({code}): {message}")]
    MalformedResponse {
        code: ResponseErrorCode,
        message: String,
    },

    /// A pipeline phase failed and the run was halted.
    #[error("phase '{phase}' failed: {source}")]
    PhaseFailed {
        phase: String,
        #[source]
        source: Box<BriefwireError>,
    },

    /// A phase did not receive enough usable input to proceed.
    #[error("insufficient input: {message}")]
    InsufficientInput { message: String },

    /// Checkpoint store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Data validation error (bad date, unknown phase token, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A panic was caught and converted into an error value.
    #[error("panicked: {message}")]
    Panicked { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BriefwireError>;

impl BriefwireError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-response error with the given validator code.
    pub fn malformed(code: ResponseErrorCode, msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
            code,
            message: msg.into(),
        }
    }

    /// Create an insufficient-input error.
    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientInput {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach a phase name to a failure.
    pub fn phase_failed(phase: impl Into<String>, source: BriefwireError) -> Self {
        Self::PhaseFailed {
            phase: phase.into(),
            source: Box::new(source),
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Only transient-network failures qualify; configuration errors,
    /// malformed responses and an open breaker fail fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } => true,
            Self::Provider { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::RetryExhausted { .. }
            | Self::Config { .. }
            | Self::CircuitOpen { .. }
            | Self::MalformedResponse { .. }
            | Self::PhaseFailed { .. }
            | Self::InsufficientInput { .. }
            | Self::Storage(_)
            | Self::Io { .. }
            | Self::Serialization(_)
            | Self::Validation { .. }
            | Self::Panicked { .. } => false,
        }
    }

    /// Whether the failure came from an open circuit breaker, directly or as
    /// the last error of an exhausted retry.
    pub fn is_circuit_open(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } => true,
            Self::RetryExhausted { source, .. } => source.is_circuit_open(),
            _ => false,
        }
    }

    /// Validator code, if this is a malformed-response error.
    pub fn response_code(&self) -> Option<ResponseErrorCode> {
        match self {
            Self::MalformedResponse { code, .. } => Some(*code),
            Self::RetryExhausted { source, .. } | Self::PhaseFailed { source, .. } => {
                source.response_code()
            }
            _ => None,
        }
    }

    /// Short machine-readable code used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Network(_) => "network",
            Self::Timeout { .. } => "timeout",
            Self::Provider { .. } => "provider",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::MalformedResponse { code, .. } => code.as_str(),
            Self::PhaseFailed { .. } => "phase_failed",
            Self::InsufficientInput { .. } => "insufficient_input",
            Self::Storage(_) => "storage",
            Self::Io { .. } => "io",
            Self::Serialization(_) => "serialization",
            Self::Validation { .. } => "validation",
            Self::Panicked { .. } => "panicked",
        }
    }
}

impl From<serde_json::Error> for BriefwireError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
