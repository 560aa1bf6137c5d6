//! Request and answer types exposed by the pipeline.

use chrono::{DateTime, Utc};
use esg_core::{AppError, Collection, FilterField, RetrievalMode};
use serde::{Deserialize, Serialize};

/// One prior exchange in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    #[serde(default)]
    pub assistant: String,
    #[serde(default = "Utc::now")]
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            at: Utc::now(),
        }
    }
}

/// A user question with optional explicit mode and prior turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,

    /// Explicit retrieval mode; always wins over routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RetrievalMode>,

    /// Prior turns, oldest first
    #[serde(default)]
    pub history: Vec<Turn>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: None,
            history: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: RetrievalMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }
}

/// A resolved citation in a final answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based index as written in the answer text
    pub index: usize,
    pub chunk_id: String,
    pub collection: Collection,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Context a guided answer asks the user to supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingContext {
    Company,
    Year,
    Topic,
}

/// Failure classes surfaced in an error answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RetrievalBackendUnavailable,
    GenerationTimeout,
    GenerationBackendError,
}

impl ErrorKind {
    /// Classify an error raised during retrieval.
    pub fn for_retrieval(_err: &AppError) -> Self {
        Self::RetrievalBackendUnavailable
    }

    /// Classify an error raised during generation.
    pub fn for_generation(err: &AppError) -> Self {
        match err {
            AppError::GenerationTimeout(_) => Self::GenerationTimeout,
            _ => Self::GenerationBackendError,
        }
    }

    /// All three classes are transient backend failures; the same question
    /// may succeed on a later attempt.
    pub fn is_retryable(self) -> bool {
        match self {
            Self::RetrievalBackendUnavailable
            | Self::GenerationTimeout
            | Self::GenerationBackendError => true,
        }
    }
}

/// Outcome of one pipeline run. Every run ends in exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    /// Generated answer grounded in retrieved evidence
    Final {
        text: String,
        citations: Vec<Citation>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tables: Vec<String>,
        mode: RetrievalMode,
        /// Set when citations had to be stripped or none were given
        unverified: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relaxed: Option<FilterField>,
        low_confidence: bool,
    },

    /// Clarifying question instead of retrieval
    Guided {
        question: String,
        suggestions: Vec<String>,
        missing: Vec<MissingContext>,
    },

    /// Retrieval found nothing, even after relaxing one filter
    InsufficientEvidence {
        message: String,
        mode: RetrievalMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relaxed: Option<FilterField>,
    },

    Error {
        error: ErrorKind,
        message: String,
        retryable: bool,
    },
}

impl Answer {
    pub fn from_error(kind: ErrorKind, err: &AppError) -> Self {
        Self::Error {
            error: kind,
            message: err.to_string(),
            retryable: kind.is_retryable(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Final { .. } => "final",
            Self::Guided { .. } => "guided",
            Self::InsufficientEvidence { .. } => "insufficient_evidence",
            Self::Error { .. } => "error",
        }
    }

    pub fn citations(&self) -> &[Citation] {
        match self {
            Self::Final { citations, .. } => citations,
            _ => &[],
        }
    }

    /// Plain-text rendering, used for terminal output and session history.
    pub fn display_text(&self) -> String {
        match self {
            Self::Final { text, .. } => text.clone(),
            Self::Guided {
                question,
                suggestions,
                ..
            } => {
                let mut out = question.clone();
                for s in suggestions {
                    out.push_str("\n- ");
                    out.push_str(s);
                }
                out
            }
            Self::InsufficientEvidence { message, .. } => message.clone(),
            Self::Error { message, .. } => message.clone(),
        }
    }
}
