//! Tunables for the query-to-answer pipeline.
//!
//! Loaded from the `pipeline:` section of `.esg/config.yaml`. Every field has
//! a default so a partial section is valid.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::model::{Company, RetrievalMode};

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Evidence budget per retrieval mode
    pub top_k: TopK,

    /// Share of the `all` budget reserved for report chunks (rest goes to news)
    pub all_report_share: f32,

    /// Maximum number of query variants, including the base query
    pub max_variants: usize,

    /// Variant generation strategy
    pub expansion: Strategy,

    /// Metadata extraction strategy
    pub extraction: Strategy,

    /// Ambiguity score must exceed this to ask a clarifying question
    pub ambiguity_threshold: i32,

    /// Number of most recent turns consulted for context
    pub history_window: usize,

    /// Top evidence score below this marks the evidence low-confidence
    pub confidence_threshold: f32,

    /// Upper bound on one generation call
    pub generation_timeout_secs: u64,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Backfill years with no hit when several years are requested
    pub backfill_years: bool,

    /// Accepted fiscal year range (inclusive)
    pub year_min: u16,
    pub year_max: u16,

    /// Years offered in clarifying suggestions
    pub suggestion_years: Vec<u16>,

    /// Closed company vocabulary
    pub companies: Vec<Company>,
}

/// Evidence budget per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopK {
    pub data: usize,
    pub news: usize,
    pub all: usize,
}

impl Default for TopK {
    fn default() -> Self {
        Self {
            data: 8,
            news: 6,
            all: 10,
        }
    }
}

impl TopK {
    pub fn for_mode(&self, mode: RetrievalMode) -> usize {
        match mode {
            RetrievalMode::Data => self.data,
            RetrievalMode::News => self.news,
            RetrievalMode::All => self.all,
        }
    }
}

/// Rule-based or model-assisted strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Rules,
    Llm,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: TopK::default(),
            all_report_share: 0.5,
            max_variants: 5,
            expansion: Strategy::Rules,
            extraction: Strategy::Rules,
            ambiguity_threshold: 2,
            history_window: 15,
            confidence_threshold: 0.30,
            generation_timeout_secs: 60,
            temperature: 0.3,
            max_tokens: 1000,
            backfill_years: true,
            year_min: 2000,
            year_max: 2099,
            suggestion_years: vec![2022, 2023],
            companies: default_companies(),
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would make every run fail or behave oddly.
    pub fn validate(&self) -> AppResult<()> {
        if self.top_k.data == 0 || self.top_k.news == 0 || self.top_k.all == 0 {
            return Err(AppError::Config(
                "pipeline.topK budgets must be greater than zero".to_string(),
            ));
        }

        if self.max_variants == 0 {
            return Err(AppError::Config(
                "pipeline.maxVariants must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.all_report_share) {
            return Err(AppError::Config(format!(
                "pipeline.allReportShare must be within 0..1, got {}",
                self.all_report_share
            )));
        }

        if self.year_min > self.year_max {
            return Err(AppError::Config(format!(
                "pipeline year range is inverted: {} > {}",
                self.year_min, self.year_max
            )));
        }

        if self.generation_timeout_secs == 0 {
            return Err(AppError::Config(
                "pipeline.generationTimeoutSecs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// The ten listed companies covered by the bundled corpus.
pub fn default_companies() -> Vec<Company> {
    vec![
        Company::new("2330", "台積電", &["tsmc", "台灣積體電路", "台積"]),
        Company::new("2317", "鴻海", &["foxconn", "hon hai", "鴻海精密"]),
        Company::new("2454", "聯發科", &["mediatek", "聯發科技"]),
        Company::new("2881", "富邦金", &["fubon", "富邦金控"]),
        Company::new("2412", "中華電", &["chunghwa telecom", "中華電信", "cht"]),
        Company::new("2382", "廣達", &["quanta", "廣達電腦"]),
        Company::new("2308", "台達電", &["delta electronics", "台達"]),
        Company::new("2882", "國泰金", &["cathay", "國泰金控"]),
        Company::new("2891", "中信金", &["ctbc", "中國信託", "中信金控"]),
        Company::new("3711", "日月光投控", &["ase", "日月光"]),
    ]
}
