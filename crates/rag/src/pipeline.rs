//! The query-to-answer pipeline.
//!
//! Stages run in a fixed order: extract, classify, then either a guided
//! answer (no retrieval) or rewrite, expand, route, retrieve, assemble and
//! generate. Every failure resolves to a typed [`Answer`]; `answer_query`
//! never returns an error.

use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::expand::{LlmExpander, QueryExpander, TemplateExpander};
use crate::generate::AnswerGenerator;
use crate::guidance::GuidanceBuilder;
use crate::intent::IntentClassifier;
use crate::metadata::{LlmExtractor, MetadataExtractor, RuleBasedExtractor, Vocabulary};
use crate::retrieval::{Retriever, RetrieverSettings};
use crate::rewrite::QueryRewriter;
use crate::router::route;
use crate::store::{SqliteVectorStore, VectorStore};
use crate::types::{Answer, ErrorKind, Query};
use esg_core::{AppConfig, AppError, AppResult, PipelineConfig, RetrievalMode, Strategy};
use esg_llm::{create_client, LlmClient};
use esg_prompt::{assemble_with, resolve_prompt, unknown_overrides};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

const INSUFFICIENT_EVIDENCE_MESSAGE: &str =
    "資料不足：在目前的資料庫中找不到符合條件的 ESG 資料或新聞，請調整公司、年份或主題後再試。";

pub struct EsgPipeline {
    extractor: Arc<dyn MetadataExtractor>,
    classifier: IntentClassifier,
    guidance: GuidanceBuilder,
    rewriter: QueryRewriter,
    expander: Arc<dyn QueryExpander>,
    retriever: Retriever,
    generator: AnswerGenerator,
    store: Arc<dyn VectorStore>,
    prompt_workspace: Option<PathBuf>,
}

impl EsgPipeline {
    /// Wire every stage from pipeline settings and the three backends.
    pub fn new(
        config: &PipelineConfig,
        llm: Arc<dyn LlmClient>,
        model: &str,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let vocab = Arc::new(Vocabulary::from_config(config));

        let extractor: Arc<dyn MetadataExtractor> = match config.extraction {
            Strategy::Rules => Arc::new(RuleBasedExtractor::new(vocab.clone())),
            Strategy::Llm => Arc::new(LlmExtractor::new(llm.clone(), model, vocab.clone())),
        };
        let expander: Arc<dyn QueryExpander> = match config.expansion {
            Strategy::Rules => Arc::new(TemplateExpander::new(config.max_variants)),
            Strategy::Llm => Arc::new(LlmExpander::new(
                llm.clone(),
                model,
                vocab.clone(),
                config.max_variants,
            )),
        };

        Self {
            extractor,
            classifier: IntentClassifier::from_config(vocab.clone(), config),
            guidance: GuidanceBuilder::new(vocab.clone(), config.suggestion_years.clone()),
            rewriter: QueryRewriter::new(vocab),
            expander,
            retriever: Retriever::new(
                store.clone(),
                embedder,
                RetrieverSettings::from_config(config),
            ),
            generator: AnswerGenerator::from_config(llm, model, config),
            store,
            prompt_workspace: None,
        }
    }

    /// Build the pipeline the CLI uses: configured generation provider,
    /// configured embeddings and the workspace SQLite index.
    pub fn from_app_config(config: &AppConfig) -> AppResult<Self> {
        config.pipeline.validate()?;

        let llm = create_client(
            &config.provider,
            config.resolve_endpoint(&config.provider).as_deref(),
            config.resolve_api_key(&config.provider).as_deref(),
        )
        .map_err(AppError::Config)?;

        let embedder = create_provider(
            &config.embedding,
            config.resolve_api_key("openai").as_deref(),
        )?;

        let store = SqliteVectorStore::open(&config.index_path())?;
        let expected = format!(
            "{}:{}:{}",
            embedder.provider_name(),
            embedder.model_name(),
            embedder.dimensions()
        );
        if let Some(stored) = store.signature()? {
            if stored != expected {
                return Err(AppError::Config(format!(
                    "Index was built with embeddings '{}' but '{}' is configured",
                    stored, expected
                )));
            }
        }

        Ok(Self::new(
            &config.pipeline,
            llm,
            &config.model,
            Arc::new(store),
            embedder,
        )
        .with_prompt_workspace(config.workspace.clone()))
    }

    /// Look for prompt overrides under `<workspace>/.esg/prompts/`.
    pub fn with_prompt_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        match unknown_overrides(&workspace) {
            Ok(ids) => {
                for id in ids {
                    warn!(prompt_id = %id, "Ignoring prompt override with an unknown id");
                }
            }
            Err(e) => warn!("Could not list prompt overrides: {}", e),
        }
        self.prompt_workspace = Some(workspace);
        self
    }

    /// Readiness: the corpus has at least one chunk.
    pub async fn is_ready(&self) -> bool {
        match self.store.chunk_count().await {
            Ok(count) => count > 0,
            Err(e) => {
                warn!("Readiness check failed: {}", e);
                false
            }
        }
    }

    /// Suggested retrieval mode for a question, for mode hints in a UI.
    pub async fn route_mode(&self, query: &Query) -> RetrievalMode {
        let extracted = self.extractor.extract(&query.text).await;
        let classification = self.classifier.classify(&extracted, &query.history);
        route(query.mode, &classification.metadata, classification.intent)
    }

    /// Answer one question.
    pub async fn answer_query(&self, query: &Query) -> Answer {
        let run_id = Uuid::new_v4();
        let span = info_span!("answer_query", run_id = %run_id);
        self.run(query).instrument(span).await
    }

    async fn run(&self, query: &Query) -> Answer {
        info!(
            extractor = self.extractor.name(),
            history = query.history.len(),
            "Answering query"
        );

        let extracted = self.extractor.extract(&query.text).await;
        let classification = self.classifier.classify(&extracted, &query.history);
        debug!(
            intent = ?classification.intent,
            score = classification.score,
            companies = ?classification.metadata.companies,
            years = ?classification.metadata.years,
            "Classified query"
        );

        let mode = route(query.mode, &classification.metadata, classification.intent);

        if classification.is_ambiguous() {
            info!(missing = ?classification.missing, "Query is ambiguous, asking for context");
            return self
                .guidance
                .guide(&classification.metadata, &classification.missing, mode);
        }

        let meta = classification.metadata;
        let rewritten = self
            .rewriter
            .rewrite_in_context(&query.text, &meta, &query.history);
        let variants = self.expander.expand(&rewritten, &meta).await;
        info!(
            mode = %mode,
            rewritten = %rewritten.text,
            variants = variants.len(),
            expander = self.expander.name(),
            "Prepared retrieval"
        );

        let evidence = match self
            .retriever
            .retrieve(&variants, mode, &meta, &query.text)
            .await
        {
            Ok(evidence) => evidence,
            Err(err) => {
                warn!("Retrieval failed: {}", err);
                return Answer::from_error(ErrorKind::for_retrieval(&err), &err);
            }
        };

        if evidence.is_empty() {
            return Answer::InsufficientEvidence {
                message: INSUFFICIENT_EVIDENCE_MESSAGE.to_string(),
                mode,
                relaxed: evidence.relaxed,
            };
        }

        let prompt = match resolve_prompt(self.prompt_workspace.as_deref(), mode)
            .and_then(|def| assemble_with(&def, &query.text, mode, &evidence))
        {
            Ok(prompt) => prompt,
            Err(err) => {
                // A broken workspace template is a generation-side failure.
                warn!("Prompt assembly failed: {}", err);
                return Answer::from_error(ErrorKind::GenerationBackendError, &err);
            }
        };

        let answer = self.generator.generate(&prompt).await;
        info!(kind = answer.kind_name(), citations = answer.citations().len(), "Run complete");
        answer
    }
}
