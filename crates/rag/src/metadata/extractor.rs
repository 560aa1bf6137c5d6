//! Metadata extraction strategies

use super::detect::{
    detect_category, detect_companies, detect_sentiment, detect_signals, detect_source,
    detect_years, normalize_text,
};
use super::types::ExtractedMetadata;
use super::vocabulary::Vocabulary;
use esg_core::{AppError, AppResult, Category, Sentiment, SourceKind};
use esg_llm::{LlmClient, LlmRequest};
use serde::Deserialize;
use std::sync::Arc;

/// Parses filter keys out of free text. Never fails: unmatched fields stay
/// unspecified.
#[async_trait::async_trait]
pub trait MetadataExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, text: &str) -> ExtractedMetadata;
}

/// Dictionary and pattern based extraction over the closed vocabulary.
#[derive(Debug, Clone)]
pub struct RuleBasedExtractor {
    vocab: Arc<Vocabulary>,
}

impl RuleBasedExtractor {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Synchronous extraction, also used to resolve history turns.
    pub fn parse(&self, text: &str) -> ExtractedMetadata {
        let normalized = normalize_text(text);

        let mut meta = ExtractedMetadata {
            companies: detect_companies(&normalized, &self.vocab),
            years: detect_years(&normalized, &self.vocab),
            category: detect_category(&normalized),
            source: detect_source(&normalized),
            sentiment: detect_sentiment(&normalized),
            signals: detect_signals(&normalized),
            carried: Vec::new(),
        };
        meta.normalize();
        meta
    }
}

#[async_trait::async_trait]
impl MetadataExtractor for RuleBasedExtractor {
    fn name(&self) -> &str {
        "rules"
    }

    async fn extract(&self, text: &str) -> ExtractedMetadata {
        self.parse(text)
    }
}

/// Shape the model is asked to return.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelMetadata {
    companies: Vec<String>,
    years: Vec<serde_json::Value>,
    category: Option<String>,
    source: Option<String>,
    sentiment: Option<String>,
}

/// Model-driven extraction. Every value is checked against the vocabulary;
/// any failure falls back to the rule-based result.
pub struct LlmExtractor {
    client: Arc<dyn LlmClient>,
    model: String,
    rules: RuleBasedExtractor,
}

impl LlmExtractor {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, vocab: Arc<Vocabulary>) -> Self {
        Self {
            client,
            model: model.into(),
            rules: RuleBasedExtractor::new(vocab),
        }
    }

    fn build_prompt(&self, text: &str) -> String {
        let companies: Vec<String> = self
            .rules
            .vocabulary()
            .companies()
            .iter()
            .map(|c| format!("{} {}", c.code, c.name))
            .collect();
        let (min, max) = self.rules.vocabulary().year_bounds();

        format!(
            "從使用者問題中擷取查詢條件，只輸出 JSON：\n\
             {{\"companies\": [公司代號], \"years\": [西元年], \"category\": \"環境|社會|治理\"或null, \
             \"source\": \"report|news\"或null, \"sentiment\": \"正面|負面|中立\"或null}}\n\
             可用公司：{}\n年份範圍：{}-{}\n未提及的欄位請留空。\n\n問題：{}",
            companies.join("、"),
            min,
            max,
            text
        )
    }

    fn validate(&self, raw: ModelMetadata, base: &ExtractedMetadata) -> AppResult<ExtractedMetadata> {
        let vocab = self.rules.vocabulary();

        let mut companies = Vec::with_capacity(raw.companies.len());
        for value in &raw.companies {
            let company = vocab
                .resolve_company(value)
                .ok_or_else(|| AppError::Other(format!("unknown company '{}'", value)))?;
            companies.push(company.code.clone());
        }

        let mut years = Vec::with_capacity(raw.years.len());
        for value in &raw.years {
            let year = match value {
                serde_json::Value::Number(n) => n.as_u64().and_then(|y| u16::try_from(y).ok()),
                serde_json::Value::String(s) => s.trim().parse::<u16>().ok(),
                _ => None,
            }
            .filter(|y| vocab.year_in_range(*y))
            .ok_or_else(|| AppError::Other(format!("year out of range: {}", value)))?;
            years.push(year);
        }

        let category = match raw.category.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(s) => Some(
                Category::parse(s).ok_or_else(|| AppError::Other(format!("unknown category '{}'", s)))?,
            ),
            None => None,
        };

        let source = match raw.source.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(s) => Some(match s.trim().to_lowercase().as_str() {
                "report" | "esg" | "報告" | "報告書" => SourceKind::Report,
                "news" | "新聞" => SourceKind::News,
                other => return Err(AppError::Other(format!("unknown source '{}'", other))),
            }),
            None => None,
        };

        let sentiment = match raw.sentiment.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(s) => Some(
                Sentiment::parse(s)
                    .ok_or_else(|| AppError::Other(format!("unknown sentiment '{}'", s)))?,
            ),
            None => None,
        };

        let mut meta = ExtractedMetadata {
            companies,
            years,
            category,
            source,
            sentiment,
            signals: base.signals.clone(),
            carried: Vec::new(),
        };
        meta.normalize();
        Ok(meta)
    }

    async fn try_extract(&self, text: &str, base: &ExtractedMetadata) -> AppResult<ExtractedMetadata> {
        let request = LlmRequest::new(self.build_prompt(text), self.model.clone())
            .with_temperature(0.0)
            .with_json_output();
        let response = self.client.complete(&request).await?;

        let content = response.content.trim();
        let json = match (content.find('{'), content.rfind('}')) {
            (Some(start), Some(end)) if end > start => &content[start..=end],
            _ => return Err(AppError::Serialization("no JSON object in response".to_string())),
        };

        let raw: ModelMetadata = serde_json::from_str(json)?;
        self.validate(raw, base)
    }
}

#[async_trait::async_trait]
impl MetadataExtractor for LlmExtractor {
    fn name(&self) -> &str {
        "llm"
    }

    async fn extract(&self, text: &str) -> ExtractedMetadata {
        let base = self.rules.parse(text);
        match self.try_extract(text, &base).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(error = %e, "Model extraction rejected, using rule-based result");
                base
            }
        }
    }
}
