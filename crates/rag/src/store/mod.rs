//! Vector store abstraction over the evidence corpus.
//!
//! The retriever only needs filtered nearest-neighbour search and chunk
//! lookup; ingestion and maintenance live on the concrete store.

mod sqlite;

pub use sqlite::SqliteVectorStore;

use crate::retrieval::MetadataFilter;
use async_trait::async_trait;
use esg_core::{AppResult, Collection, EvidenceChunk};
use serde::Serialize;

/// One similarity-search result. Higher score is more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f32,
    pub collection: Collection,
}

/// Corpus statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub reports: usize,
    pub news: usize,
    pub companies: usize,
    pub years: Vec<u16>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-`k` chunks in `collection` matching `filter`, most similar first.
    ///
    /// Ties are broken by chunk id ascending so results are deterministic.
    async fn similarity_search(
        &self,
        collection: Collection,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> AppResult<Vec<SearchHit>>;

    async fn get_chunk(&self, id: &str) -> AppResult<Option<EvidenceChunk>>;

    async fn chunk_count(&self) -> AppResult<usize>;
}
