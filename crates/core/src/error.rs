//! Error types for the ESG question-answering pipeline.
//!
//! A single error enum covers configuration, I/O, generation, embedding,
//! retrieval, prompt and corpus failures. Pipeline runs never surface these
//! to callers directly: they are folded into typed answers. Everything
//! outside a run (config loading, corpus ingestion, the CLI) propagates them.

use thiserror::Error;

/// Unified error type for the ESG workspace.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generation backend errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Generation did not finish within the configured bound
    #[error("Generation timed out after {0}s")]
    GenerationTimeout(u64),

    /// Embedding backend errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Corpus ingestion errors
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether retrying the same request may succeed.
    ///
    /// Backend failures are transient; malformed input and configuration
    /// problems are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Io(_)
                | AppError::Llm(_)
                | AppError::GenerationTimeout(_)
                | AppError::Embedding(_)
                | AppError::Retrieval(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
