//! Shared domain types for ESG retrieval.
//!
//! These types cross crate boundaries: the retriever produces them, the
//! prompt builder consumes them and the CLI prints them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Retrieval mode selected for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Both report data and news
    All,
    /// Structured report data only
    Data,
    /// News articles only
    News,
}

impl RetrievalMode {
    /// Parse a mode name. Accepts the original API aliases `esg` and `report`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Some(Self::All),
            "data" | "esg" | "report" => Some(Self::Data),
            "news" => Some(Self::News),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Data => "data",
            Self::News => "news",
        }
    }

    /// Collections searched in this mode.
    pub fn collections(&self) -> &'static [Collection] {
        match self {
            Self::All => &[Collection::EsgReport, Collection::News],
            Self::Data => &[Collection::EsgReport],
            Self::News => &[Collection::News],
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Corpus partition a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    EsgReport,
    News,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EsgReport => "esg_report",
            Self::News => "news",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "esg_report" => Some(Self::EsgReport),
            "news" => Some(Self::News),
            _ => None,
        }
    }
}

/// ESG pillar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Environmental,
    Social,
    Governance,
}

impl Category {
    pub const ALL: [Category; 3] = [Self::Environmental, Self::Social, Self::Governance];

    /// Label used in the corpus (環境/社會/治理).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Environmental => "環境",
            Self::Social => "社會",
            Self::Governance => "治理",
        }
    }

    /// Parse either the Chinese label, the English name or the E/S/G letter.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "環境" | "environmental" | "environment" | "e" => Some(Self::Environmental),
            "社會" | "social" | "s" => Some(Self::Social),
            "治理" | "governance" | "g" => Some(Self::Governance),
            _ => None,
        }
    }
}

/// Where a chunk (or a requested answer) comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Report,
    News,
}

impl SourceKind {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Report => Collection::EsgReport,
            Self::News => Collection::News,
        }
    }
}

/// News sentiment label assigned by the article classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Positive => "正面",
            Self::Negative => "負面",
            Self::Neutral => "中立",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "正面" | "positive" => Some(Self::Positive),
            "負面" | "negative" => Some(Self::Negative),
            "中立" | "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

/// Metadata fields a retrieval filter can constrain.
///
/// Declaration order is relaxation order: the first specified field in this
/// order is the one dropped when a filtered search comes back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterField {
    Sentiment,
    Category,
    Source,
    Year,
    Company,
}

impl FilterField {
    pub const RELAXATION_ORDER: [FilterField; 5] = [
        Self::Sentiment,
        Self::Category,
        Self::Source,
        Self::Year,
        Self::Company,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Category => "category",
            Self::Source => "source",
            Self::Year => "year",
            Self::Company => "company",
        }
    }
}

/// Known company in the closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Exchange ticker code, e.g. "2330"
    pub code: String,

    /// Canonical short name, e.g. "台積電"
    pub name: String,

    /// Extra surface forms (English names, long names)
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Company {
    pub fn new(code: &str, name: &str, aliases: &[&str]) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Every surface form this company may appear as, excluding the code.
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(|a| a.as_str()))
    }
}

/// Metadata attached to every evidence chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,

    /// Report indicator, e.g. "溫室氣體排放"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator: Option<String>,

    /// Report field within the indicator, e.g. "範疇一"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_field: Option<String>,

    /// Raw disclosed value as written in the report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_text: Option<String>,

    /// Parsed numeric value, present only when the raw value is a plain number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_num: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// News topic keyword
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
}

impl ChunkMetadata {
    /// Whether this chunk carries a structured numeric value.
    pub fn is_numeric(&self) -> bool {
        self.value_num.is_some()
    }

    /// Short human label for citation lists.
    pub fn display_label(&self) -> String {
        let company = self
            .company_name
            .as_deref()
            .or(self.company_code.as_deref())
            .unwrap_or("-");
        match (&self.title, &self.indicator) {
            (Some(title), _) => format!("{}｜{}", title, company),
            (None, Some(indicator)) => {
                let year = self.year.map(|y| y.to_string()).unwrap_or_default();
                format!("{} {} {}", company, year, indicator)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            (None, None) => company.to_string(),
        }
    }
}

/// A retrievable unit of corpus text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub id: String,
    pub text: String,
    pub collection: Collection,
    pub metadata: ChunkMetadata,

    /// Embedding vector (opaque to everything but the store)
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// A chunk with its merged similarity score and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvidence {
    pub chunk: EvidenceChunk,
    pub score: f32,

    /// Indices of the query variants that retrieved this chunk
    pub provenance: BTreeSet<usize>,
}

/// Deduplicated, ranked evidence for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedEvidence {
    /// Sorted by score descending, ties by chunk id ascending
    pub items: Vec<ScoredEvidence>,

    /// Filter field dropped by relaxation, if relaxation fired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relaxed: Option<FilterField>,

    /// Top score fell below the confidence threshold
    #[serde(default)]
    pub low_confidence: bool,
}

impl RankedEvidence {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn max_score(&self) -> Option<f32> {
        self.items.iter().map(|e| e.score).reduce(f32::max)
    }

    /// Whether any retrieved chunk carries a numeric field.
    pub fn has_numeric(&self) -> bool {
        self.items.iter().any(|e| e.chunk.metadata.is_numeric())
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.items.iter().any(|e| e.chunk.id == chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(RetrievalMode::parse("all"), Some(RetrievalMode::All));
        assert_eq!(RetrievalMode::parse("DATA"), Some(RetrievalMode::Data));
        assert_eq!(RetrievalMode::parse("esg"), Some(RetrievalMode::Data));
        assert_eq!(RetrievalMode::parse("news"), Some(RetrievalMode::News));
        assert_eq!(RetrievalMode::parse("web"), None);
    }

    #[test]
    fn test_mode_collections() {
        assert_eq!(RetrievalMode::Data.collections(), &[Collection::EsgReport]);
        assert_eq!(RetrievalMode::News.collections(), &[Collection::News]);
        assert_eq!(RetrievalMode::All.collections().len(), 2);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(Category::parse("環境"), Some(Category::Environmental));
        assert_eq!(Category::parse("Social"), Some(Category::Social));
        assert_eq!(Category::parse("G"), Some(Category::Governance));
        assert_eq!(Category::parse("finance"), None);
    }

    #[test]
    fn test_relaxation_order_matches_ordering() {
        let mut fields = FilterField::RELAXATION_ORDER.to_vec();
        fields.sort();
        assert_eq!(fields, FilterField::RELAXATION_ORDER.to_vec());
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        let json = serde_json::to_string(&RetrievalMode::News).unwrap();
        assert_eq!(json, "\"news\"");
        let json = serde_json::to_string(&Collection::EsgReport).unwrap();
        assert_eq!(json, "\"esg_report\"");
    }

    #[test]
    fn test_display_label() {
        let meta = ChunkMetadata {
            company_name: Some("台積電".into()),
            year: Some(2023),
            indicator: Some("溫室氣體排放".into()),
            ..Default::default()
        };
        assert_eq!(meta.display_label(), "台積電 2023 溫室氣體排放");

        let news = ChunkMetadata {
            company_name: Some("鴻海".into()),
            title: Some("鴻海發布永續報告".into()),
            ..Default::default()
        };
        assert_eq!(news.display_label(), "鴻海發布永續報告｜鴻海");
    }
}
