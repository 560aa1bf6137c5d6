//! SQLite-backed vector store.
//!
//! Filterable metadata lives in plain columns; the full chunk metadata is a
//! JSON blob. Similarity is brute-force cosine over the filtered rows, which
//! is plenty for a corpus of a few hundred thousand chunks.

use super::{SearchHit, StoreStats, VectorStore};
use crate::embeddings::cosine_similarity;
use crate::retrieval::MetadataFilter;
use async_trait::async_trait;
use esg_core::{AppError, AppResult, ChunkMetadata, Collection, EvidenceChunk};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SIGNATURE_KEY: &str = "embedding_signature";

pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorStore").finish_non_exhaustive()
    }
}

impl SqliteVectorStore {
    /// Open (and create if needed) the store at `path`.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Retrieval(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Retrieval(format!("Failed to open SQLite index: {}", e)))?;
        Self::init(conn, &format!("{:?}", path))
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Retrieval(format!("Failed to open SQLite index: {}", e)))?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, location: &str) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                company_code TEXT,
                year INTEGER,
                category TEXT,
                sentiment TEXT,
                metadata TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS corpus_info (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection);
            CREATE INDEX IF NOT EXISTS idx_chunks_company_year ON chunks(company_code, year);
            "#,
        )
        .map_err(|e| AppError::Retrieval(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Initialized SQLite index at {}", location);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Retrieval("Vector store lock poisoned".to_string()))
    }

    /// Insert chunks in one transaction. Chunks whose id already exists are
    /// skipped. Returns the number inserted.
    pub fn insert_chunks(&self, chunks: &[EvidenceChunk]) -> AppResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Retrieval(format!("Failed to begin transaction: {}", e)))?;

        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO chunks
                     (id, collection, text, embedding, company_code, year, category, sentiment, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(|e| AppError::Retrieval(format!("Failed to prepare insert: {}", e)))?;

            for chunk in chunks {
                let embedding = chunk.embedding.as_ref().ok_or_else(|| {
                    AppError::Retrieval(format!("Chunk {} missing embedding", chunk.id))
                })?;
                let metadata_json = serde_json::to_string(&chunk.metadata)?;
                let meta = &chunk.metadata;

                inserted += stmt
                    .execute(params![
                        chunk.id,
                        chunk.collection.as_str(),
                        chunk.text,
                        embedding_to_bytes(embedding),
                        meta.company_code,
                        meta.year.map(i64::from),
                        meta.category.map(|c| c.label()),
                        meta.sentiment.map(|s| s.label()),
                        metadata_json,
                    ])
                    .map_err(|e| AppError::Retrieval(format!("Failed to insert chunk: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| AppError::Retrieval(format!("Failed to commit chunks: {}", e)))?;
        Ok(inserted)
    }

    pub fn contains(&self, id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM chunks WHERE id = ?1", [id], |row| row.get(0))
            .optional()
            .map_err(|e| AppError::Retrieval(format!("Failed to look up chunk: {}", e)))?;
        Ok(found.is_some())
    }

    /// Delete every chunk and the recorded embedding signature.
    pub fn reset(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM corpus_info;")
            .map_err(|e| AppError::Retrieval(format!("Failed to reset index: {}", e)))?;
        tracing::info!("Reset evidence index");
        Ok(())
    }

    pub fn stats(&self) -> AppResult<StoreStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> AppResult<usize> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|v| v as usize)
                .map_err(|e| AppError::Retrieval(format!("Failed to count chunks: {}", e)))
        };

        let total = count("SELECT COUNT(*) FROM chunks")?;
        let reports = count("SELECT COUNT(*) FROM chunks WHERE collection = 'esg_report'")?;
        let news = count("SELECT COUNT(*) FROM chunks WHERE collection = 'news'")?;
        let companies = count(
            "SELECT COUNT(DISTINCT company_code) FROM chunks WHERE company_code IS NOT NULL",
        )?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT year FROM chunks WHERE year IS NOT NULL ORDER BY year")
            .map_err(|e| AppError::Retrieval(format!("Failed to prepare query: {}", e)))?;
        let years = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(|e| AppError::Retrieval(format!("Failed to list years: {}", e)))?
            .filter_map(|r| r.ok())
            .filter_map(|y| u16::try_from(y).ok())
            .collect();

        Ok(StoreStats {
            total,
            reports,
            news,
            companies,
            years,
        })
    }

    /// Embedding model signature the index was built with, if recorded.
    pub fn signature(&self) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM corpus_info WHERE key = ?1",
            [SIGNATURE_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| AppError::Retrieval(format!("Failed to read corpus info: {}", e)))
    }

    /// Record the embedding model signature, or check it against the one the
    /// index was built with. Mixing embedding spaces makes scores meaningless.
    pub fn ensure_signature(&self, signature: &str) -> AppResult<()> {
        match self.signature()? {
            Some(stored) if stored != signature => Err(AppError::Retrieval(format!(
                "Index was built with embeddings '{}' but '{}' is configured; reset the corpus and reload it",
                stored, signature
            ))),
            Some(_) => Ok(()),
            None => {
                let conn = self.lock()?;
                conn.execute(
                    "INSERT INTO corpus_info (key, value) VALUES (?1, ?2)",
                    params![SIGNATURE_KEY, signature],
                )
                .map_err(|e| AppError::Retrieval(format!("Failed to write corpus info: {}", e)))?;
                Ok(())
            }
        }
    }
}

/// Build the WHERE clause and bind values for a filtered search.
fn filter_clause(collection: Collection, filter: &MetadataFilter) -> (String, Vec<Value>) {
    let mut clauses = vec!["collection = ?".to_string()];
    let mut values = vec![Value::Text(collection.as_str().to_string())];

    if !filter.companies.is_empty() {
        clauses.push(format!(
            "company_code IN ({})",
            placeholders(filter.companies.len())
        ));
        values.extend(filter.companies.iter().cloned().map(Value::Text));
    }
    if !filter.years.is_empty() {
        clauses.push(format!("year IN ({})", placeholders(filter.years.len())));
        values.extend(filter.years.iter().map(|y| Value::Integer(i64::from(*y))));
    }
    if let Some(category) = filter.category {
        clauses.push("category = ?".to_string());
        values.push(Value::Text(category.label().to_string()));
    }
    if let Some(sentiment) = filter.sentiment_for(collection) {
        clauses.push("sentiment = ?".to_string());
        values.push(Value::Text(sentiment.label().to_string()));
    }

    (clauses.join(" AND "), values)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn similarity_search(
        &self,
        collection: Collection,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> AppResult<Vec<SearchHit>> {
        if k == 0 || !filter.matches_collection(collection) {
            return Ok(Vec::new());
        }

        let (where_clause, values) = filter_clause(collection, filter);
        let sql = format!("SELECT id, embedding FROM chunks WHERE {}", where_clause);

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Retrieval(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| AppError::Retrieval(format!("Failed to query chunks: {}", e)))?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, bytes) =
                row.map_err(|e| AppError::Retrieval(format!("Failed to read chunk row: {}", e)))?;
            let stored = bytes_to_embedding(&bytes)?;
            hits.push(SearchHit {
                chunk_id: id,
                score: cosine_similarity(embedding, &stored),
                collection,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);

        tracing::debug!(
            collection = collection.as_str(),
            "Retrieved {} chunks (requested top-{})",
            hits.len(),
            k
        );
        Ok(hits)
    }

    async fn get_chunk(&self, id: &str) -> AppResult<Option<EvidenceChunk>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, collection, text, embedding, metadata FROM chunks WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| AppError::Retrieval(format!("Failed to load chunk: {}", e)))?;

        let Some((id, collection, text, bytes, metadata_json)) = row else {
            return Ok(None);
        };

        let collection = Collection::parse(&collection).ok_or_else(|| {
            AppError::Retrieval(format!("Unknown collection '{}' for chunk {}", collection, id))
        })?;
        let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)?;

        Ok(Some(EvidenceChunk {
            id,
            text,
            collection,
            metadata,
            embedding: Some(bytes_to_embedding(&bytes)?),
        }))
    }

    async fn chunk_count(&self) -> AppResult<usize> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get::<_, i64>(0))
            .map(|v| v as usize)
            .map_err(|e| AppError::Retrieval(format!("Failed to count chunks: {}", e)))
    }
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Retrieval(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use esg_core::{Category, Sentiment, SourceKind};
    use tempfile::TempDir;

    fn chunk(id: &str, collection: Collection, code: &str, year: u16, emb: Vec<f32>) -> EvidenceChunk {
        EvidenceChunk {
            id: id.to_string(),
            text: format!("text of {}", id),
            collection,
            metadata: ChunkMetadata {
                company_code: Some(code.to_string()),
                year: Some(year),
                category: Some(Category::Environmental),
                sentiment: (collection == Collection::News).then_some(Sentiment::Negative),
                ..Default::default()
            },
            embedding: Some(emb),
        }
    }

    fn seeded() -> SqliteVectorStore {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        store
            .insert_chunks(&[
                chunk("a", Collection::EsgReport, "2330", 2023, vec![1.0, 0.0, 0.0]),
                chunk("b", Collection::EsgReport, "2330", 2022, vec![0.9, 0.1, 0.0]),
                chunk("c", Collection::EsgReport, "2317", 2023, vec![1.0, 0.0, 0.0]),
                chunk("n1", Collection::News, "2330", 2023, vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_open_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("index.sqlite");
        let store = SqliteVectorStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.stats().unwrap().total, 0);
    }

    #[test]
    fn test_insert_skips_existing_ids() {
        let store = seeded();
        let again = store
            .insert_chunks(&[chunk("a", Collection::EsgReport, "2330", 2023, vec![1.0, 0.0, 0.0])])
            .unwrap();
        assert_eq!(again, 0);
        assert!(store.contains("a").unwrap());
        assert!(!store.contains("zzz").unwrap());
    }

    #[test]
    fn test_insert_requires_embedding() {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        let mut c = chunk("x", Collection::News, "2330", 2023, vec![]);
        c.embedding = None;
        assert!(store.insert_chunks(&[c]).is_err());
    }

    #[tokio::test]
    async fn test_search_respects_filter_and_collection() {
        let store = seeded();
        let filter = MetadataFilter {
            companies: vec!["2330".into()],
            years: vec![2023],
            ..Default::default()
        };
        let hits = store
            .similarity_search(Collection::EsgReport, &[1.0, 0.0, 0.0], &filter, 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "a");
        assert_eq!(hits[0].collection, Collection::EsgReport);
    }

    #[tokio::test]
    async fn test_search_orders_by_score_then_id() {
        let store = seeded();
        let hits = store
            .similarity_search(
                Collection::EsgReport,
                &[1.0, 0.0, 0.0],
                &MetadataFilter::default(),
                3,
            )
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!(hits[0].score >= hits[2].score);
    }

    #[tokio::test]
    async fn test_source_excludes_other_collection() {
        let store = seeded();
        let filter = MetadataFilter {
            source: Some(SourceKind::News),
            ..Default::default()
        };
        let reports = store
            .similarity_search(Collection::EsgReport, &[1.0, 0.0, 0.0], &filter, 10)
            .await
            .unwrap();
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_sentiment_filter_only_on_news() {
        let store = seeded();
        let filter = MetadataFilter {
            sentiment: Some(Sentiment::Positive),
            ..Default::default()
        };
        let reports = store
            .similarity_search(Collection::EsgReport, &[1.0, 0.0, 0.0], &filter, 10)
            .await
            .unwrap();
        assert_eq!(reports.len(), 3);
        let news = store
            .similarity_search(Collection::News, &[0.0, 1.0, 0.0], &filter, 10)
            .await
            .unwrap();
        assert!(news.is_empty());
    }

    #[tokio::test]
    async fn test_get_chunk_round_trips_metadata() {
        let store = seeded();
        let loaded = store.get_chunk("n1").await.unwrap().unwrap();
        assert_eq!(loaded.collection, Collection::News);
        assert_eq!(loaded.metadata.sentiment, Some(Sentiment::Negative));
        assert_eq!(loaded.embedding, Some(vec![0.0, 1.0, 0.0]));
        assert!(store.get_chunk("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_stats_and_reset() {
        let store = seeded();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.reports, 3);
        assert_eq!(stats.news, 1);
        assert_eq!(stats.companies, 2);
        assert_eq!(stats.years, vec![2022, 2023]);

        store.reset().unwrap();
        assert_eq!(store.stats().unwrap().total, 0);
    }

    #[test]
    fn test_signature_mismatch_is_rejected() {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        assert_eq!(store.signature().unwrap(), None);
        store.ensure_signature("trigram:trigram-v1:384").unwrap();
        store.ensure_signature("trigram:trigram-v1:384").unwrap();
        assert_eq!(store.signature().unwrap().as_deref(), Some("trigram:trigram-v1:384"));
        assert!(store.ensure_signature("ollama:bge-m3:1024").is_err());
    }

    #[test]
    fn test_embedding_bytes() {
        let emb = vec![0.5f32, -1.25, 3.0];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&emb)).unwrap(), emb);
        assert!(bytes_to_embedding(&[0, 1, 2]).is_err());
    }
}
