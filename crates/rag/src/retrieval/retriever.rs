//! Multi-variant filtered retrieval.

use super::filter::MetadataFilter;
use super::merge::{rank, select_top_k, HitPool};
use crate::embeddings::EmbeddingProvider;
use crate::expand::QueryVariant;
use crate::metadata::ExtractedMetadata;
use crate::store::VectorStore;
use esg_core::{
    AppError, AppResult, EvidenceChunk, FilterField, PipelineConfig, RankedEvidence,
    RetrievalMode,
};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Retrieval tunables, taken from the pipeline config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrieverSettings {
    pub top_k: esg_core::TopK,
    pub all_report_share: f32,
    pub confidence_threshold: f32,
    pub backfill_years: bool,
}

impl RetrieverSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            top_k: config.top_k,
            all_report_share: config.all_report_share,
            confidence_threshold: config.confidence_threshold,
            backfill_years: config.backfill_years,
        }
    }
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: RetrieverSettings,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrieverSettings {
        &self.settings
    }

    /// Retrieve with the configured budget for `mode`.
    pub async fn retrieve(
        &self,
        variants: &[QueryVariant],
        mode: RetrievalMode,
        meta: &ExtractedMetadata,
        raw_query: &str,
    ) -> AppResult<RankedEvidence> {
        let k = self.settings.top_k.for_mode(mode);
        self.retrieve_k(variants, mode, meta, raw_query, k).await
    }

    /// Search every variant against the mode's collections, merge, and keep
    /// the top `k`.
    ///
    /// An empty result under the full filter is retried once with the least
    /// specific field dropped. Only backend failures are errors; no evidence
    /// is an empty `RankedEvidence`.
    ///
    /// Chunks found by per-year backfill are added after the top-`k` cut, so
    /// a multi-year question can return more than `k` items: at most
    /// `max(3, k / 2)` extra per requested year that had no evidence.
    #[instrument(skip_all, fields(mode = %mode, variants = variants.len(), k = k))]
    pub async fn retrieve_k(
        &self,
        variants: &[QueryVariant],
        mode: RetrievalMode,
        meta: &ExtractedMetadata,
        raw_query: &str,
        k: usize,
    ) -> AppResult<RankedEvidence> {
        if variants.is_empty() || k == 0 {
            return Ok(RankedEvidence::default());
        }

        let texts: Vec<String> = variants.iter().map(|v| v.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Expected {} query embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let mut filter = MetadataFilter::from_metadata(meta);
        let mut pool = self.search(&embeddings, 0, mode, &filter, k).await?;

        if pool.is_empty() {
            pool = self
                .raw_backoff(variants, raw_query, mode, &filter, k)
                .await?;
        }

        let mut relaxed: Option<FilterField> = None;
        if pool.is_empty() {
            if let Some((looser, field)) = filter.relax(mode) {
                info!(field = field.as_str(), "No evidence under full filter, relaxing");
                pool = self.search(&embeddings, 0, mode, &looser, k).await?;
                filter = looser;
                relaxed = Some(field);
            }
        }

        if pool.is_empty() {
            info!("No evidence found");
            return Ok(RankedEvidence {
                items: Vec::new(),
                relaxed,
                low_confidence: false,
            });
        }

        let mut chunks = self.hydrate(&pool, &HashMap::new()).await?;

        let mut backfill = HitPool::new();
        if self.settings.backfill_years && filter.years.len() > 1 {
            backfill = self
                .backfill_years(&embeddings[0], mode, &filter, &chunks, k)
                .await?;
            chunks.extend(self.hydrate(&backfill, &chunks).await?);
        }

        let mut items = select_top_k(
            pool.into_scored(&chunks),
            mode,
            k,
            self.settings.all_report_share,
        );
        // Backfilled years ride on top of the budget.
        if !backfill.is_empty() {
            let extra: Vec<_> = backfill
                .into_scored(&chunks)
                .into_iter()
                .filter(|e| !items.iter().any(|i| i.chunk.id == e.chunk.id))
                .collect();
            items.extend(extra);
            rank(&mut items);
        }

        let mut ranked = RankedEvidence {
            items,
            relaxed,
            low_confidence: false,
        };
        ranked.low_confidence = ranked
            .max_score()
            .is_some_and(|s| s < self.settings.confidence_threshold);

        debug!(
            count = ranked.len(),
            max_score = ranked.max_score().unwrap_or_default(),
            low_confidence = ranked.low_confidence,
            "Ranked evidence"
        );
        Ok(ranked)
    }

    /// Run every (variant, collection) search concurrently and merge.
    ///
    /// Variant indices in provenance start at `first_variant`.
    async fn search(
        &self,
        embeddings: &[Vec<f32>],
        first_variant: usize,
        mode: RetrievalMode,
        filter: &MetadataFilter,
        k: usize,
    ) -> AppResult<HitPool> {
        let collections = filter.collections(mode);
        let collections = &collections;
        let searches = embeddings.iter().enumerate().flat_map(move |(i, embedding)| {
            collections.iter().map(move |&collection| async move {
                let hits = self
                    .store
                    .similarity_search(collection, embedding, filter, k)
                    .await?;
                Ok::<_, AppError>((first_variant + i, hits))
            })
        });

        let mut pool = HitPool::new();
        for result in join_all(searches).await {
            let (variant, hits) = result?;
            pool.add(variant, hits);
        }
        Ok(pool)
    }

    /// One more search with the raw question when the rewritten variants
    /// found nothing. Its provenance index is one past the last variant.
    async fn raw_backoff(
        &self,
        variants: &[QueryVariant],
        raw_query: &str,
        mode: RetrievalMode,
        filter: &MetadataFilter,
        k: usize,
    ) -> AppResult<HitPool> {
        let raw = raw_query.trim();
        if raw.is_empty() || variants.iter().any(|v| v.text == raw) {
            return Ok(HitPool::new());
        }

        debug!("Variants found nothing, backing off to the raw query");
        let embedding = self.embedder.embed(raw).await?;
        self.search(&[embedding], variants.len(), mode, filter, k)
            .await
    }

    /// Extra base-variant searches for requested years with no evidence.
    async fn backfill_years(
        &self,
        base: &[f32],
        mode: RetrievalMode,
        filter: &MetadataFilter,
        chunks: &HashMap<String, EvidenceChunk>,
        k: usize,
    ) -> AppResult<HitPool> {
        let covered: BTreeSet<u16> = chunks.values().filter_map(|c| c.metadata.year).collect();
        let missing: Vec<u16> = filter
            .years
            .iter()
            .copied()
            .filter(|y| !covered.contains(y))
            .collect();

        let mut pool = HitPool::new();
        if missing.is_empty() {
            return Ok(pool);
        }

        let per_year_k = (k / 2).max(3);
        debug!(?missing, per_year_k, "Backfilling years without evidence");
        for year in missing {
            let narrowed = filter.with_year(year);
            pool.absorb(
                self.search(&[base.to_vec()], 0, mode, &narrowed, per_year_k)
                    .await?,
            );
        }
        Ok(pool)
    }

    /// Load chunk bodies for pooled ids not already in `known`.
    async fn hydrate(
        &self,
        pool: &HitPool,
        known: &HashMap<String, EvidenceChunk>,
    ) -> AppResult<HashMap<String, EvidenceChunk>> {
        let mut chunks = HashMap::new();
        for id in pool.ids().filter(|id| !known.contains_key(*id)) {
            match self.store.get_chunk(id).await? {
                Some(chunk) => {
                    chunks.insert(id.to_string(), chunk);
                }
                None => warn!(chunk_id = id, "Search returned an id the store cannot load"),
            }
        }
        Ok(chunks)
    }
}
