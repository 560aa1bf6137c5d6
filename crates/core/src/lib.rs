//! ESG Q&A core library.
//!
//! Foundational pieces shared by every crate in the workspace:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management, including pipeline tunables
//! - The shared evidence domain model

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;

// Re-export commonly used types
pub use config::{AppConfig, EmbeddingConfig};
pub use error::{AppError, AppResult};
pub use model::{
    Category, ChunkMetadata, Collection, Company, EvidenceChunk, FilterField, RankedEvidence,
    RetrievalMode, ScoredEvidence, Sentiment, SourceKind,
};
pub use pipeline::{PipelineConfig, Strategy, TopK};
