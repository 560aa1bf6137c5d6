//! Direct vs. guided classification.
//!
//! An additive score over the extracted signals decides whether a question
//! carries enough context to bound retrieval. Company and year are resolved
//! against recent history first, so follow-ups like "那用水量呢" inherit the
//! previous turn's entities.

use crate::metadata::{ExtractedMetadata, RuleBasedExtractor, Vocabulary};
use crate::types::{MissingContext, Turn};
use esg_core::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const NO_COMPANY: i32 = 1;
const NO_YEAR: i32 = 1;
const VAGUE: i32 = 2;
const DEFINITIONAL: i32 = 1;
const EMPTY: i32 = 3;
const METRIC_TERM: i32 = -1;
const NEWS_TERM: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Direct,
    Ambiguous,
}

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub score: i32,
    /// Extracted metadata with history carry-forward applied
    pub metadata: ExtractedMetadata,
    pub missing: Vec<MissingContext>,
}

impl Classification {
    pub fn is_ambiguous(&self) -> bool {
        self.intent == Intent::Ambiguous
    }
}

pub struct IntentClassifier {
    rules: RuleBasedExtractor,
    threshold: i32,
    history_window: usize,
}

impl IntentClassifier {
    pub fn new(vocab: Arc<Vocabulary>, threshold: i32, history_window: usize) -> Self {
        Self {
            rules: RuleBasedExtractor::new(vocab),
            threshold,
            history_window,
        }
    }

    pub fn from_config(vocab: Arc<Vocabulary>, config: &PipelineConfig) -> Self {
        Self::new(vocab, config.ambiguity_threshold, config.history_window)
    }

    /// Apply company/year carry-forward from the most recent turns that
    /// named them.
    pub fn resolve(&self, extracted: &ExtractedMetadata, history: &[Turn]) -> ExtractedMetadata {
        let mut resolved = extracted.clone();
        if resolved.has_company() && resolved.has_year() {
            return resolved;
        }

        let mut prior = ExtractedMetadata::default();
        for turn in history.iter().rev().take(self.history_window) {
            let meta = self.rules.parse(&turn.user);
            if !prior.has_company() && meta.has_company() {
                prior.companies = meta.companies;
            }
            if !prior.has_year() && meta.has_year() {
                prior.years = meta.years;
            }
            if prior.has_company() && prior.has_year() {
                break;
            }
        }

        resolved.carry_forward(&prior);
        if !resolved.carried.is_empty() {
            tracing::debug!(carried = ?resolved.carried, "Carried context from history");
        }
        resolved
    }

    pub fn score(meta: &ExtractedMetadata) -> i32 {
        let s = &meta.signals;
        let mut score = 0;
        if !meta.has_company() {
            score += NO_COMPANY;
        }
        if !meta.has_year() {
            score += NO_YEAR;
        }
        if s.vague {
            score += VAGUE;
        }
        if s.definitional {
            score += DEFINITIONAL;
        }
        if s.empty {
            score += EMPTY;
        }
        if s.has_metric() {
            score += METRIC_TERM;
        }
        if s.has_news() || meta.sentiment.is_some() {
            score += NEWS_TERM;
        }
        score
    }

    pub fn classify(&self, extracted: &ExtractedMetadata, history: &[Turn]) -> Classification {
        let metadata = self.resolve(extracted, history);
        let score = Self::score(&metadata);

        // Equal to the threshold still counts as direct.
        let intent = if score > self.threshold {
            Intent::Ambiguous
        } else {
            Intent::Direct
        };

        let mut missing = Vec::new();
        if !metadata.has_company() {
            missing.push(MissingContext::Company);
        }
        if !metadata.has_year() {
            missing.push(MissingContext::Year);
        }
        if !metadata.signals.has_metric() && !metadata.signals.has_news() {
            missing.push(MissingContext::Topic);
        }

        tracing::debug!(score, threshold = self.threshold, ?intent, "Classified query");

        Classification {
            intent,
            score,
            metadata,
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esg_core::pipeline::default_companies;
    use esg_core::FilterField;

    fn classifier() -> (IntentClassifier, RuleBasedExtractor) {
        let vocab = Arc::new(Vocabulary::new(default_companies(), 2000, 2099));
        (
            IntentClassifier::new(vocab.clone(), 2, 15),
            RuleBasedExtractor::new(vocab),
        )
    }

    fn classify(text: &str, history: &[Turn]) -> Classification {
        let (c, rules) = classifier();
        c.classify(&rules.parse(text), history)
    }

    #[test]
    fn test_specific_metric_question_is_direct() {
        let result = classify("2023年台積電的碳排放量是多少", &[]);
        assert_eq!(result.intent, Intent::Direct);
        assert!(result.score < 0);
    }

    #[test]
    fn test_definitional_question_is_ambiguous() {
        let result = classify("ESG是什麼", &[]);
        assert_eq!(result.intent, Intent::Ambiguous);
        assert_eq!(result.score, 3);
        assert!(result.missing.contains(&MissingContext::Company));
    }

    #[test]
    fn test_greeting_and_empty_are_ambiguous() {
        assert!(classify("你好", &[]).is_ambiguous());
        assert!(classify("   ", &[]).is_ambiguous());
        assert!(classify("hi", &[]).is_ambiguous());
    }

    #[test]
    fn test_tie_is_direct() {
        // no year (+1), vague (+2), news term (-1) = 2 = threshold
        let result = classify("台積電有什麼新聞", &[]);
        assert_eq!(result.score, 2);
        assert_eq!(result.intent, Intent::Direct);
    }

    #[test]
    fn test_history_carries_company_and_year() {
        let history = vec![Turn::new("2023年台積電的碳排放量是多少", "…")];
        let result = classify("那用水量呢", &history);

        assert_eq!(result.intent, Intent::Direct);
        assert_eq!(result.metadata.companies, vec!["2330"]);
        assert_eq!(result.metadata.years, vec![2023]);
        assert!(result.metadata.carried.contains(&FilterField::Company));
        assert!(result.metadata.carried.contains(&FilterField::Year));
    }

    #[test]
    fn test_current_query_overrides_history() {
        let history = vec![Turn::new("2023年台積電的碳排放量", "…")];
        let result = classify("鴻海呢", &history);
        assert_eq!(result.metadata.companies, vec!["2317"]);
        assert_eq!(result.metadata.years, vec![2023]);
        assert_eq!(result.metadata.carried, vec![FilterField::Year]);
    }

    #[test]
    fn test_history_window_limits_lookback() {
        let vocab = Arc::new(Vocabulary::new(default_companies(), 2000, 2099));
        let c = IntentClassifier::new(vocab.clone(), 2, 1);
        let rules = RuleBasedExtractor::new(vocab);
        let history = vec![Turn::new("台積電 2023", "…"), Turn::new("謝謝", "…")];

        let result = c.classify(&rules.parse("用電量"), &history);
        assert!(result.metadata.companies.is_empty());
    }
}
