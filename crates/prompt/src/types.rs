//! Prompt types.

use esg_core::{ChunkMetadata, Collection, FilterField, RetrievalMode};
use serde::{Deserialize, Serialize};

/// Phrase the model is told to use when evidence cannot answer the question.
pub const INSUFFICIENT_EVIDENCE_PHRASE: &str = "資料不足";

/// A prompt definition: built in, or loaded from `.esg/prompts/<id>.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier, e.g. "esg.answer.data"
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// System message template (Handlebars)
    #[serde(default)]
    pub system: String,

    /// User message template (Handlebars)
    pub template: String,

    /// Output format settings
    #[serde(default)]
    pub output: PromptOutputSpec,
}

/// Output format settings for the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// Output format (e.g., "markdown")
    pub format: String,
}

impl Default for PromptOutputSpec {
    fn default() -> Self {
        Self {
            format: "markdown".to_string(),
        }
    }
}

/// An instruction placed in the system message. Every directive scopes the
/// model to the supplied evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    EvidenceOnly,
    CiteEveryClaim,
    NumericTable,
    DataFormatting,
    NewsDigest,
    DeclareInsufficiency,
    CautiousLanguage,
    RelaxedScope,
}

impl Directive {
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::EvidenceOnly => {
                "只能根據【檢索到的內容】作答，禁止臆測或引用外部資料。"
            }
            Self::CiteEveryClaim => {
                "每一個事實陳述後都必須以 [n] 標註引用的內容編號，只能使用下方列出的編號。"
            }
            Self::NumericTable => {
                "數值型答案請以 Markdown 表格呈現（欄位：公司、指標、年份、數值、單位、引用），年份由舊到新。"
            }
            Self::DataFormatting => {
                "若單位為「仟元」請換算為「元」並加上千分位（例：3,633,000）；其他單位保留原單位；缺值請寫「該項數值未提供」；文末「次相關可查詢」列出最多 5 個次相關指標名稱。"
            }
            Self::NewsDigest => {
                "列點 2 則重點新聞，每則附標題與 Markdown 連結（僅限來源清單中的網址），再以 2–4 句總結重點。"
            }
            Self::DeclareInsufficiency => {
                "若檢索內容不足以回答，請明確寫出「資料不足」並說明缺少哪些資訊，不要自行補齊。"
            }
            Self::CautiousLanguage => {
                "檢索內容與問題的相關度偏低，請使用保守措辭，並提醒使用者資料可能不完全相符。"
            }
            Self::RelaxedScope => {
                "部分篩選條件已被放寬，請說明引用內容可能不完全符合使用者指定的條件。"
            }
        }
    }
}

/// One evidence chunk as presented to the model, with its citation index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedEvidence {
    /// Stable 1-based citation index
    pub index: usize,
    pub chunk_id: String,
    pub score: f32,
    pub collection: Collection,
    pub label: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A fully built prompt ready for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationPrompt {
    /// Original user question
    pub query: String,

    pub mode: RetrievalMode,

    /// Evidence in citation order
    pub evidence: Vec<CitedEvidence>,

    pub directives: Vec<Directive>,

    /// Rendered system message
    pub system: String,

    /// Rendered user message
    pub user: String,

    pub metadata: BuiltPromptMetadata,
}

impl GenerationPrompt {
    /// Look up evidence by citation index.
    pub fn citation(&self, index: usize) -> Option<&CitedEvidence> {
        index
            .checked_sub(1)
            .and_then(|i| self.evidence.get(i))
            .filter(|e| e.index == index)
    }

    pub fn has_directive(&self, directive: Directive) -> bool {
        self.directives.contains(&directive)
    }
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    #[serde(rename = "lowConfidence")]
    pub low_confidence: bool,

    #[serde(rename = "relaxed", skip_serializing_if = "Option::is_none")]
    pub relaxed: Option<FilterField>,

    #[serde(rename = "numericEvidence")]
    pub numeric_evidence: bool,
}
