//! Multi-query expansion.
//!
//! Produces 1..N phrasings of the rewritten query for recall. The first
//! variant is always the rewritten query itself. Variants never name a
//! company or year the question did not.

use crate::metadata::{detect_companies, detect_years, normalize_text, ExtractedMetadata, Vocabulary};
use crate::rewrite::RewrittenQuery;
use esg_llm::{LlmClient, LlmRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Synonym restatements for canonical metric terms.
const METRIC_SYNONYMS: &[(&str, &str)] = &[
    ("碳排放", "溫室氣體排放量 範疇一 範疇二"),
    ("溫室氣體", "碳排放 範疇一 範疇二 範疇三"),
    ("用電量", "能源使用 電力消耗"),
    ("再生能源", "綠電 再生能源使用比例"),
    ("用水量", "取水量 水資源管理"),
    ("廢棄物", "廢棄物產生量 回收率"),
    ("員工人數", "員工 人力結構"),
    ("獨立董事", "董事會 獨立性"),
    ("職業災害", "職災 工安"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantAngle {
    Direct,
    Metric,
    Synonym,
    Comparison,
    News,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryVariant {
    pub text: String,
    pub angle: VariantAngle,
}

impl QueryVariant {
    pub fn new(text: impl Into<String>, angle: VariantAngle) -> Self {
        Self {
            text: text.into(),
            angle,
        }
    }
}

#[async_trait::async_trait]
pub trait QueryExpander: Send + Sync {
    fn name(&self) -> &str;

    /// Expand into at least one variant, base query first.
    async fn expand(&self, rewritten: &RewrittenQuery, meta: &ExtractedMetadata) -> Vec<QueryVariant>;
}

/// Deterministic template expansion.
#[derive(Debug, Clone)]
pub struct TemplateExpander {
    max_variants: usize,
}

impl TemplateExpander {
    pub fn new(max_variants: usize) -> Self {
        Self {
            max_variants: max_variants.max(1),
        }
    }

    pub fn variants(&self, rewritten: &RewrittenQuery, meta: &ExtractedMetadata) -> Vec<QueryVariant> {
        let base = rewritten.text.as_str();
        let mut out = vec![QueryVariant::new(base, VariantAngle::Direct)];

        if meta.signals.has_metric() {
            push_unique(&mut out, format!("{} 數據 數值", base), VariantAngle::Metric);
        }

        let synonyms: Vec<&str> = base
            .split_whitespace()
            .filter_map(|token| {
                METRIC_SYNONYMS
                    .iter()
                    .find(|(term, _)| *term == token)
                    .map(|(_, syn)| *syn)
            })
            .collect();
        if !synonyms.is_empty() {
            push_unique(
                &mut out,
                format!("{} {}", base, synonyms.join(" ")),
                VariantAngle::Synonym,
            );
        }

        if meta.signals.comparison || meta.years.len() > 1 {
            push_unique(&mut out, format!("{} 歷年 趨勢 比較", base), VariantAngle::Comparison);
        }

        if meta.signals.has_news() || meta.sentiment.is_some() {
            push_unique(&mut out, format!("{} 新聞 報導", base), VariantAngle::News);
        }

        out.truncate(self.max_variants);
        out
    }
}

#[async_trait::async_trait]
impl QueryExpander for TemplateExpander {
    fn name(&self) -> &str {
        "template"
    }

    async fn expand(&self, rewritten: &RewrittenQuery, meta: &ExtractedMetadata) -> Vec<QueryVariant> {
        self.variants(rewritten, meta)
    }
}

fn push_unique(out: &mut Vec<QueryVariant>, text: String, angle: VariantAngle) {
    if !out.iter().any(|v| v.text.eq_ignore_ascii_case(&text)) {
        out.push(QueryVariant::new(text, angle));
    }
}

/// Model-generated phrasings with an entity guard and template fallback.
pub struct LlmExpander {
    client: Arc<dyn LlmClient>,
    model: String,
    vocab: Arc<Vocabulary>,
    fallback: TemplateExpander,
    max_variants: usize,
}

impl LlmExpander {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        vocab: Arc<Vocabulary>,
        max_variants: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            vocab,
            fallback: TemplateExpander::new(max_variants),
            max_variants: max_variants.max(1),
        }
    }

    fn build_prompt(&self, base: &str) -> String {
        format!(
            "請將以下查詢改寫成 {} 個語意互補的檢索查詢，每行一個，不要編號，\
             不要加入原查詢沒有提到的公司或年份。\n查詢：{}",
            self.max_variants.saturating_sub(1).max(1),
            base
        )
    }

    /// A variant may only mention companies and years already in the question.
    fn within_entities(&self, text: &str, meta: &ExtractedMetadata) -> bool {
        let normalized = normalize_text(text);
        let companies_ok = detect_companies(&normalized, &self.vocab)
            .iter()
            .all(|c| meta.companies.contains(c));
        let years_ok = detect_years(&normalized, &self.vocab)
            .iter()
            .all(|y| meta.years.contains(y));
        companies_ok && years_ok
    }

    fn parse_lines(&self, content: &str, base: &str, meta: &ExtractedMetadata) -> Vec<QueryVariant> {
        let mut out = vec![QueryVariant::new(base, VariantAngle::Direct)];
        let mut seen = vec![base.to_lowercase()];

        for line in content.lines() {
            let cleaned = clean_line(line);
            if cleaned.is_empty() {
                continue;
            }
            let key = cleaned.to_lowercase();
            if seen.contains(&key) {
                continue;
            }
            if !self.within_entities(&cleaned, meta) {
                tracing::debug!(variant = %cleaned, "Dropped variant introducing new entities");
                continue;
            }
            seen.push(key);
            out.push(QueryVariant::new(cleaned, VariantAngle::Model));
            if out.len() >= self.max_variants {
                break;
            }
        }
        out
    }
}

/// Strip bullets and list numbering ("1.", "2)", "-", "•").
fn clean_line(line: &str) -> String {
    let trimmed = line.trim();
    let without_bullet = trimmed.trim_start_matches(['-', '*', '•', '・']);
    let digits = without_bullet
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    // Numbering is one or two digits plus a separator, so "2023 碳排放" and
    // "2023. 碳排放" keep their year.
    let rest = match without_bullet[digits..].strip_prefix(['.', ')', '、', '．', '）']) {
        Some(rest) if (1..=2).contains(&digits) => rest,
        _ => without_bullet,
    };
    rest.trim().trim_matches('"').trim().to_string()
}

#[async_trait::async_trait]
impl QueryExpander for LlmExpander {
    fn name(&self) -> &str {
        "llm"
    }

    async fn expand(&self, rewritten: &RewrittenQuery, meta: &ExtractedMetadata) -> Vec<QueryVariant> {
        if self.max_variants == 1 {
            return vec![QueryVariant::new(rewritten.text.clone(), VariantAngle::Direct)];
        }

        let request = LlmRequest::new(self.build_prompt(&rewritten.text), self.model.clone())
            .with_temperature(0.2);

        match self.client.complete(&request).await {
            Ok(response) => self.parse_lines(&response.content, &rewritten.text, meta),
            Err(e) => {
                tracing::warn!(error = %e, "Model expansion failed, using templates");
                self.fallback.variants(rewritten, meta)
            }
        }
    }
}
