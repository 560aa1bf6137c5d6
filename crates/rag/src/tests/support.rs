//! Test doubles and fixtures shared across the crate's tests.

use crate::corpus::{CorpusLoader, NewsArticle, ReportRow};
use crate::embeddings::TrigramProvider;
use crate::metadata::Vocabulary;
use crate::pipeline::EsgPipeline;
use crate::retrieval::MetadataFilter;
use crate::store::{SearchHit, SqliteVectorStore, VectorStore};
use async_trait::async_trait;
use esg_core::pipeline::default_companies;
use esg_core::{
    AppError, AppResult, ChunkMetadata, Collection, EvidenceChunk, PipelineConfig, RankedEvidence,
    ScoredEvidence,
};
use esg_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Generation client that replays canned outputs in order and records every
/// request it receives.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<AppResult<String>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<AppResult<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Llm("script exhausted".to_string())));
        next.map(|content| LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(10, 10),
        })
    }
}

/// Wraps a store and records every search it serves.
pub struct RecordingStore {
    inner: Arc<dyn VectorStore>,
    searches: Mutex<Vec<(Collection, MetadataFilter)>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn VectorStore>) -> Self {
        Self {
            inner,
            searches: Mutex::new(Vec::new()),
        }
    }

    pub fn searches(&self) -> Vec<(Collection, MetadataFilter)> {
        self.searches.lock().unwrap().clone()
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn similarity_search(
        &self,
        collection: Collection,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        self.searches
            .lock()
            .unwrap()
            .push((collection, filter.clone()));
        self.inner
            .similarity_search(collection, embedding, filter, k)
            .await
    }

    async fn get_chunk(&self, id: &str) -> AppResult<Option<EvidenceChunk>> {
        self.inner.get_chunk(id).await
    }

    async fn chunk_count(&self) -> AppResult<usize> {
        self.inner.chunk_count().await
    }
}

/// A store whose backend is down.
pub struct UnavailableStore;

#[async_trait]
impl VectorStore for UnavailableStore {
    async fn similarity_search(
        &self,
        _collection: Collection,
        _embedding: &[f32],
        _filter: &MetadataFilter,
        _k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        Err(AppError::Retrieval("connection refused".to_string()))
    }

    async fn get_chunk(&self, _id: &str) -> AppResult<Option<EvidenceChunk>> {
        Err(AppError::Retrieval("connection refused".to_string()))
    }

    async fn chunk_count(&self) -> AppResult<usize> {
        Err(AppError::Retrieval("connection refused".to_string()))
    }
}

pub fn vocab() -> Arc<Vocabulary> {
    Arc::new(Vocabulary::new(default_companies(), 2000, 2099))
}

fn report(code: &str, name: &str, year: u16, indicator: &str, field: &str, value: &str) -> ReportRow {
    ReportRow {
        company_code: code.to_string(),
        company_name: name.to_string(),
        year: year.to_string(),
        category: "環境".to_string(),
        indicator: indicator.to_string(),
        field: field.to_string(),
        sub_field: "排放量".to_string(),
        value: value.to_string(),
    }
}

/// Report rows used by the scenario tests.
pub fn report_rows() -> Vec<ReportRow> {
    vec![
        report("2330", "台積電", 2023, "溫室氣體排放", "範疇一", "1620000"),
        report("2330", "台積電", 2023, "溫室氣體排放", "範疇二", "9860000"),
        report("2330", "台積電", 2022, "溫室氣體排放", "範疇一", "1560000"),
        report("2330", "台積電", 2023, "用水量", "總取水量", "101000"),
        report("2317", "鴻海", 2023, "溫室氣體排放", "範疇一", "212000"),
    ]
}

pub fn news_articles() -> Vec<NewsArticle> {
    vec![
        NewsArticle {
            title: "台積電擴大再生能源採購".to_string(),
            content: "台積電宣布簽署新的綠電購售合約，目標提前達成淨零排放。".to_string(),
            company_code: "2330".to_string(),
            company_name: "台積電".to_string(),
            category: "環境".to_string(),
            sentiment: "正面".to_string(),
            keyword: "再生能源".to_string(),
            url: "https://news.example.com/tsmc-green".to_string(),
            year: Some(2023),
            article_id: None,
        },
        NewsArticle {
            title: "鴻海工廠勞動爭議".to_string(),
            content: "媒體報導鴻海海外工廠出現加班爭議，公司表示將調查。".to_string(),
            company_code: "2317".to_string(),
            company_name: "鴻海".to_string(),
            category: "社會".to_string(),
            sentiment: "負面".to_string(),
            keyword: "勞動".to_string(),
            url: "https://news.example.com/foxconn-labor".to_string(),
            year: Some(2023),
            article_id: None,
        },
    ]
}

/// In-memory store loaded with the fixture corpus.
pub async fn fixture_store() -> Arc<SqliteVectorStore> {
    let store = Arc::new(SqliteVectorStore::open_in_memory().unwrap());
    let loader = CorpusLoader::new(
        store.clone(),
        Arc::new(TrigramProvider::new(EMBEDDING_DIMENSIONS)),
        vocab(),
    );

    let vocabulary = vocab();
    let mut chunks: Vec<EvidenceChunk> = report_rows()
        .iter()
        .map(|r| r.to_chunk(&vocabulary))
        .collect();
    for article in news_articles() {
        chunks.extend(article.to_chunks(&vocabulary).unwrap());
    }
    loader.ingest(chunks).await.unwrap();
    store
}

/// Pipeline over `store` with default settings and a scripted generator.
pub fn pipeline(store: Arc<dyn VectorStore>, llm: Arc<ScriptedLlm>) -> EsgPipeline {
    EsgPipeline::new(
        &PipelineConfig::default(),
        llm,
        "test-model",
        store,
        Arc::new(TrigramProvider::new(EMBEDDING_DIMENSIONS)),
    )
}

/// Ranked evidence with report chunks for TSMC 2023 and bare news chunks.
pub fn evidence(items: Vec<(&str, Collection, f32)>) -> RankedEvidence {
    RankedEvidence {
        items: items
            .into_iter()
            .map(|(id, collection, score)| ScoredEvidence {
                chunk: EvidenceChunk {
                    id: id.to_string(),
                    text: format!("evidence {}", id),
                    collection,
                    metadata: match collection {
                        Collection::EsgReport => ChunkMetadata {
                            company_code: Some("2330".to_string()),
                            company_name: Some("台積電".to_string()),
                            year: Some(2023),
                            indicator: Some("溫室氣體排放".to_string()),
                            value_num: Some(100.0),
                            ..Default::default()
                        },
                        Collection::News => ChunkMetadata {
                            title: Some(format!("headline {}", id)),
                            url: Some(format!("https://news.example.com/{}", id)),
                            ..Default::default()
                        },
                    },
                    embedding: None,
                },
                score,
                provenance: BTreeSet::from([0]),
            })
            .collect(),
        relaxed: None,
        low_confidence: false,
    }
}
