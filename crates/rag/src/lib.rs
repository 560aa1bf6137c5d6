//! ESG question-answering pipeline.
//!
//! Turns a raw question into a cited answer:
//! metadata extraction and ambiguity classification, query rewriting,
//! multi-query expansion, mode routing, filtered retrieval over the
//! report/news corpus, prompt assembly and bounded generation.
//!
//! Guided answers short-circuit after classification and never touch the
//! vector store.

pub mod corpus;
pub mod embeddings;
pub mod expand;
pub mod generate;
pub mod guidance;
pub mod history;
pub mod intent;
pub mod metadata;
pub mod pipeline;
pub mod retrieval;
pub mod rewrite;
pub mod router;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

pub use corpus::{CorpusLoader, LoadReport, NewsArticle, ReportRow};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use expand::{LlmExpander, QueryExpander, QueryVariant, TemplateExpander, VariantAngle};
pub use generate::AnswerGenerator;
pub use history::SessionStore;
pub use intent::{Classification, Intent, IntentClassifier};
pub use metadata::{
    ExtractedMetadata, LlmExtractor, MetadataExtractor, QuerySignals, RuleBasedExtractor,
    Vocabulary,
};
pub use pipeline::EsgPipeline;
pub use retrieval::{MetadataFilter, Retriever, RetrieverSettings};
pub use rewrite::{QueryRewriter, RewrittenQuery};
pub use router::route;
pub use store::{SearchHit, SqliteVectorStore, StoreStats, VectorStore};
pub use types::{Answer, Citation, ErrorKind, MissingContext, Query, Turn};
