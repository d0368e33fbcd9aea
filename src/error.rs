//! Error types for petforge operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions and key-pool management
//! - Transform request parsing and validation
//! - Batch driving and checkpointing
//! - Dataset reading, repair and cleansing
//! - Record evaluation

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: no key flag given and no PETFORGE_API_KEY* variable set")]
    MissingApiKey,

    #[error("Missing API base URL: PETFORGE_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlmError {
    /// Whether this error indicates a per-key rate or quota limit.
    ///
    /// Providers are inconsistent about surfacing quota exhaustion: some return
    /// a clean 429, others a generic error whose message mentions the quota.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            LlmError::RateLimited(_) => true,
            LlmError::ApiError { code: 429, .. } => true,
            LlmError::ApiError { message, .. } | LlmError::RequestFailed(message) => {
                let lower = message.to_lowercase();
                lower.contains("429") || lower.contains("quota") || lower.contains("rate limit")
            }
            _ => false,
        }
    }
}

/// Errors that can occur while transforming a single work item.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Empty reply from model")]
    EmptyReply,

    #[error("No JSON object found in reply: {0}")]
    NoJsonInReply(String),

    #[error("Reply failed schema validation: {0}")]
    InvalidReply(String),

    #[error("Reply echoed wrong category or emotion: expected {expected}, got {actual}")]
    EchoMismatch { expected: String, actual: String },

    #[error("Retry budget exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("All API keys saturated for too long")]
    KeysExhausted,

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during batch runs and checkpointing.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Checkpoint file '{path}' is corrupt: {reason}")]
    CorruptCheckpoint { path: String, reason: String },

    #[error("Input file '{0}' contains no usable records")]
    EmptyInput(String),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while reading, repairing or cleansing datasets.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Malformed JSON on line {line}: {message}")]
    MalformedLine { line: usize, message: String },

    #[error("No objects could be recovered from '{0}'")]
    NothingRecovered(String),

    #[error("Missing required field '{field}' in record {index}")]
    MissingField { field: String, index: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during record evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Embedding request failed: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Fluency model has no training corpus")]
    UntrainedModel,

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
