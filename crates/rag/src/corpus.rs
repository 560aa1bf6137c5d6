//! Corpus ingestion from JSONL exports.
//!
//! Report rows become one chunk each. News articles are split into
//! overlapping character windows so long articles stay retrievable.
//! Chunk ids are content hashes, so reloading the same export is a no-op.

use crate::embeddings::EmbeddingProvider;
use crate::metadata::Vocabulary;
use crate::store::SqliteVectorStore;
use esg_core::{
    AppError, AppResult, Category, ChunkMetadata, Collection, EvidenceChunk, Sentiment,
};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{info, warn};

const NEWS_CHUNK_CHARS: usize = 800;
const NEWS_CHUNK_OVERLAP: usize = 120;
const EMBED_BATCH: usize = 64;

static PLAIN_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?\d+(\.\d+)?$").expect("number pattern is valid"));

/// One disclosed indicator value from a sustainability report export.
///
/// Accepts both the English keys and the column names of the exchange's
/// export (公司代號, 年度, 數值, ...). Numbers and strings are both accepted
/// for every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(default, alias = "公司代號", deserialize_with = "lenient_text")]
    pub company_code: String,
    #[serde(default, alias = "公司名稱", deserialize_with = "lenient_text")]
    pub company_name: String,
    #[serde(default, alias = "年度", deserialize_with = "lenient_text")]
    pub year: String,
    #[serde(default, alias = "類別", deserialize_with = "lenient_text")]
    pub category: String,
    #[serde(default, alias = "指標名稱", deserialize_with = "lenient_text")]
    pub indicator: String,
    #[serde(default, alias = "區段", deserialize_with = "lenient_text")]
    pub field: String,
    #[serde(default, alias = "欄位名稱", deserialize_with = "lenient_text")]
    pub sub_field: String,
    #[serde(default, alias = "數值", deserialize_with = "lenient_text")]
    pub value: String,
}

/// A classified news article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub company_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub company_code: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub sentiment: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub keyword: String,
    /// Publication year, when known
    #[serde(default, alias = "published_year")]
    pub year: Option<u16>,
    #[serde(default)]
    pub article_id: Option<String>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn sha256_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn norm_text(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn parse_year(raw: &str) -> Option<u16> {
    let value: f64 = raw.trim().parse().ok()?;
    (value.is_finite() && (0.0..65536.0).contains(&value)).then_some(value as u16)
}

/// The value as a number, only when the raw text is a plain number.
/// Thousands separators are ignored; anything with a unit is not numeric.
fn parse_plain_number(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(',', "");
    let cleaned = cleaned.trim();
    if !PLAIN_NUMBER_RE.is_match(cleaned) {
        return None;
    }
    cleaned.parse().ok()
}

/// Fill a missing code or name from the vocabulary.
fn resolve_company(code: &str, name: &str, vocab: &Vocabulary) -> (Option<String>, Option<String>) {
    let mut code = non_empty(code);
    let mut name = non_empty(name);
    let known = code
        .as_deref()
        .and_then(|c| vocab.company(c))
        .or_else(|| name.as_deref().and_then(|n| vocab.resolve_company(n)));
    if let Some(company) = known {
        code.get_or_insert_with(|| company.code.clone());
        name.get_or_insert_with(|| company.name.clone());
    }
    (code, name)
}

impl ReportRow {
    pub fn chunk_id(&self) -> String {
        sha256_hex(&format!(
            "report|{}|{}|{}|{}|{}|{}|{}",
            self.company_code.trim(),
            self.company_name.trim(),
            self.year.trim(),
            self.indicator.trim(),
            self.field.trim(),
            self.sub_field.trim(),
            self.value.trim()
        ))
    }

    pub fn to_chunk(&self, vocab: &Vocabulary) -> EvidenceChunk {
        let (company_code, company_name) =
            resolve_company(&self.company_code, &self.company_name, vocab);

        let text = norm_text(&format!(
            "公司代號: {}\n公司名稱: {}\n年度: {}\n類別: {}\n指標名稱: {}\n區段: {}\n欄位名稱: {}\n數值: {}\n",
            company_code.as_deref().unwrap_or(""),
            company_name.as_deref().unwrap_or(""),
            self.year.trim(),
            self.category.trim(),
            self.indicator.trim(),
            self.field.trim(),
            self.sub_field.trim(),
            self.value.trim()
        ));

        EvidenceChunk {
            id: self.chunk_id(),
            text,
            collection: Collection::EsgReport,
            metadata: ChunkMetadata {
                company_code,
                company_name,
                year: parse_year(&self.year),
                category: Category::parse(&self.category),
                indicator: non_empty(&self.indicator),
                field: non_empty(&self.field),
                sub_field: non_empty(&self.sub_field),
                value_text: non_empty(&self.value),
                value_num: parse_plain_number(&self.value),
                ..Default::default()
            },
            embedding: None,
        }
    }
}

impl NewsArticle {
    pub fn article_id(&self) -> String {
        self.article_id.clone().unwrap_or_else(|| {
            sha256_hex(&format!(
                "news|{}|{}|{}|{}",
                self.title.trim(),
                self.company_name.trim(),
                self.company_code.trim(),
                self.url.trim()
            ))
        })
    }

    /// Split title plus body into overlapping windows, one chunk each.
    pub fn to_chunks(&self, vocab: &Vocabulary) -> AppResult<Vec<EvidenceChunk>> {
        let config = ChunkConfig::new(NEWS_CHUNK_CHARS)
            .with_overlap(NEWS_CHUNK_OVERLAP)
            .map_err(|e| AppError::Corpus(format!("Invalid news chunk config: {}", e)))?;
        let splitter = TextSplitter::new(config);

        let title = norm_text(&self.title);
        let full_text = norm_text(&format!("{}\n\n{}", title, norm_text(&self.content)));
        if full_text.is_empty() {
            return Ok(Vec::new());
        }

        let mut pieces: Vec<&str> = splitter.chunks(&full_text).collect();
        if pieces.is_empty() {
            pieces.push(&full_text);
        }

        let article_id = self.article_id();
        let (company_code, company_name) =
            resolve_company(&self.company_code, &self.company_name, vocab);

        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(j, piece)| {
                let text = norm_text(&format!(
                    "標題：{}\n內容：{}\n類別：{}\n公司：{}\n情緒：{}\n關鍵字：{}\n",
                    title,
                    piece,
                    self.category.trim(),
                    company_name.as_deref().unwrap_or(""),
                    self.sentiment.trim(),
                    self.keyword.trim()
                ));
                EvidenceChunk {
                    id: sha256_hex(&format!("{}|chunk|{}", article_id, j)),
                    text,
                    collection: Collection::News,
                    metadata: ChunkMetadata {
                        company_code: company_code.clone(),
                        company_name: company_name.clone(),
                        year: self.year,
                        category: Category::parse(&self.category),
                        sentiment: Sentiment::parse(&self.sentiment),
                        keyword: non_empty(&self.keyword),
                        title: non_empty(&title),
                        url: non_empty(&self.url),
                        article_id: Some(article_id.clone()),
                        chunk_index: Some(j as u32),
                        ..Default::default()
                    },
                    embedding: None,
                }
            })
            .collect())
    }
}

/// Read one JSON record per line. Malformed lines are logged and counted,
/// not fatal.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> AppResult<(Vec<T>, usize)> {
    let file = std::fs::File::open(path)
        .map_err(|e| AppError::Corpus(format!("Failed to open {:?}: {}", path, e)))?;

    let mut records = Vec::new();
    let mut invalid = 0;
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Skipping line {} of {:?}: {}", line_num + 1, path, e);
                invalid += 1;
            }
        }
    }
    Ok((records, invalid))
}

/// Outcome of one load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub records: usize,
    pub invalid: usize,
    pub chunks: usize,
    pub inserted: usize,
    pub skipped: usize,
}

impl LoadReport {
    pub fn merge(&mut self, other: LoadReport) {
        self.records += other.records;
        self.invalid += other.invalid;
        self.chunks += other.chunks;
        self.inserted += other.inserted;
        self.skipped += other.skipped;
    }
}

/// Embeds and stores corpus records.
pub struct CorpusLoader {
    store: Arc<SqliteVectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    vocab: Arc<Vocabulary>,
}

impl CorpusLoader {
    pub fn new(
        store: Arc<SqliteVectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        vocab: Arc<Vocabulary>,
    ) -> Self {
        Self {
            store,
            embedder,
            vocab,
        }
    }

    fn signature(&self) -> String {
        format!(
            "{}:{}:{}",
            self.embedder.provider_name(),
            self.embedder.model_name(),
            self.embedder.dimensions()
        )
    }

    pub async fn load_reports(&self, path: &Path) -> AppResult<LoadReport> {
        let (rows, invalid) = read_jsonl::<ReportRow>(path)?;
        info!("Loaded {} report rows from {:?}", rows.len(), path);
        let chunks = rows.iter().map(|r| r.to_chunk(&self.vocab)).collect();

        let mut report = self.ingest(chunks).await?;
        report.records = rows.len();
        report.invalid = invalid;
        Ok(report)
    }

    pub async fn load_news(&self, path: &Path) -> AppResult<LoadReport> {
        let (articles, invalid) = read_jsonl::<NewsArticle>(path)?;
        info!("Loaded {} news articles from {:?}", articles.len(), path);

        let mut chunks = Vec::new();
        for article in &articles {
            chunks.extend(article.to_chunks(&self.vocab)?);
        }

        let mut report = self.ingest(chunks).await?;
        report.records = articles.len();
        report.invalid = invalid;
        Ok(report)
    }

    /// Embed and insert chunks whose ids are not stored yet.
    pub async fn ingest(&self, chunks: Vec<EvidenceChunk>) -> AppResult<LoadReport> {
        self.store.ensure_signature(&self.signature())?;

        let mut report = LoadReport {
            chunks: chunks.len(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for chunk in chunks {
            if !seen.insert(chunk.id.clone()) || self.store.contains(&chunk.id)? {
                report.skipped += 1;
                continue;
            }
            fresh.push(chunk);
        }

        for batch in fresh.chunks_mut(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(AppError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }
            for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
                chunk.embedding = Some(embedding);
            }
            report.inserted += self.store.insert_chunks(batch)?;
        }

        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            "Ingested corpus chunks"
        );
        Ok(report)
    }
}
