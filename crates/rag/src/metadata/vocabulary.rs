//! Closed vocabulary: companies, year bounds and term lexicons

use esg_core::{Category, Company, PipelineConfig, Sentiment};

/// Numeric or field-sounding terms that point at report data.
pub const METRIC_TERMS: &[&str] = &[
    "碳排放", "碳排", "溫室氣體", "排放量", "範疇一", "範疇二", "範疇三", "scope",
    "用電", "電力", "能源", "再生能源", "綠電", "用水", "取水", "廢棄物", "回收",
    "員工", "女性", "薪資", "離職率", "職災", "工時", "訓練時數", "董事", "董事會",
    "出席率", "捐贈", "數據", "數值", "指標", "多少", "比例", "佔比", "金額",
    "emission", "emissions", "ghg", "co2", "energy", "water", "waste", "kwh", "salary",
    "turnover",
];

/// News and topic terms, including sentiment words.
pub const NEWS_TERMS: &[&str] = &[
    "新聞", "報導", "消息", "事件", "爭議", "輿情", "媒體", "最新", "近期", "動態",
    "正面", "負面", "中立", "news", "headline", "headlines",
];

pub const COMPARISON_TERMS: &[&str] = &[
    "比較", "趨勢", "歷年", "變化", "成長", "差異", "對比", "vs", "compare", "trend",
];

pub const DEFINITIONAL_TERMS: &[&str] = &[
    "是什麼", "什麼是", "是甚麼", "意思", "定義", "介紹", "what is", "what's", "define",
];

/// Vague phrasing from the production chatbot's guidance rules.
pub const VAGUE_PHRASES: &[&str] = &[
    "可以查", "能查", "查什麼", "有哪些", "有什麼", "能問", "幫我查", "幫我看", "您好",
    "怎麼查", "哪些資料", "我想知道", "介紹一下", "怎麼用", "怎麼開始", "嗨", "你好",
    "哈囉",
];

/// Greetings that only count when they are the whole query.
pub const GREETINGS: &[&str] = &["hi", "hello", "hey", "help", "?"];

pub const REPORT_SOURCE_TERMS: &[&str] = &["報告書", "永續報告", "年報", "揭露", "report"];

pub const NEWS_SOURCE_TERMS: &[&str] = &["新聞", "報導", "媒體", "news"];

pub const CATEGORY_TERMS: &[(&str, Category)] = &[
    ("環境", Category::Environmental),
    ("environmental", Category::Environmental),
    ("environment", Category::Environmental),
    ("社會", Category::Social),
    ("social", Category::Social),
    ("治理", Category::Governance),
    ("governance", Category::Governance),
];

pub const SENTIMENT_TERMS: &[(&str, Sentiment)] = &[
    ("正面", Sentiment::Positive),
    ("positive", Sentiment::Positive),
    ("負面", Sentiment::Negative),
    ("negative", Sentiment::Negative),
    ("中立", Sentiment::Neutral),
    ("neutral", Sentiment::Neutral),
];

/// Companies and year bounds the extractor may recognise.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    companies: Vec<Company>,
    year_min: u16,
    year_max: u16,
    /// (lowercased surface form, company index), longest form first
    surface_index: Vec<(String, usize)>,
}

impl Vocabulary {
    pub fn new(companies: Vec<Company>, year_min: u16, year_max: u16) -> Self {
        let mut surface_index: Vec<(String, usize)> = companies
            .iter()
            .enumerate()
            .flat_map(|(i, c)| c.surface_forms().map(move |f| (f.to_lowercase(), i)))
            .filter(|(f, _)| !f.is_empty())
            .collect();
        surface_index.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });

        Self {
            companies,
            year_min,
            year_max,
            surface_index,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.companies.clone(), config.year_min, config.year_max)
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    pub fn company(&self, code: &str) -> Option<&Company> {
        self.companies.iter().find(|c| c.code == code)
    }

    pub fn is_company_code(&self, token: &str) -> bool {
        self.company(token).is_some()
    }

    pub fn year_in_range(&self, year: u16) -> bool {
        (self.year_min..=self.year_max).contains(&year)
    }

    pub fn year_bounds(&self) -> (u16, u16) {
        (self.year_min, self.year_max)
    }

    /// Resolve a code, name or alias (case-insensitive) to a company.
    pub fn resolve_company(&self, value: &str) -> Option<&Company> {
        let value = value.trim();
        if let Some(c) = self.company(value) {
            return Some(c);
        }
        let lower = value.to_lowercase();
        self.surface_index
            .iter()
            .find(|(form, _)| *form == lower)
            .and_then(|(_, i)| self.companies.get(*i))
    }

    /// Codes of every company whose name or alias occurs in `lower_text`.
    pub fn match_companies(&self, lower_text: &str) -> Vec<String> {
        let mut codes = Vec::new();
        for (form, i) in &self.surface_index {
            if contains_term(lower_text, form) {
                if let Some(c) = self.companies.get(*i) {
                    if !codes.contains(&c.code) {
                        codes.push(c.code.clone());
                    }
                }
            }
        }
        codes
    }

    /// Lowercased surface forms, longest first.
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        self.surface_index.iter().map(|(f, _)| f.as_str())
    }
}

/// Substring match; ASCII terms must also sit on word boundaries so that
/// short aliases like "ase" do not fire inside "please".
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if !term.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '\'') {
        return haystack.contains(term);
    }

    haystack.match_indices(term).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + term.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

/// Terms from `lexicon` present in `lower_text`, in lexicon order.
pub fn find_terms(lower_text: &str, lexicon: &[&str]) -> Vec<String> {
    lexicon
        .iter()
        .filter(|t| contains_term(lower_text, t))
        .map(|t| t.to_string())
        .collect()
}
