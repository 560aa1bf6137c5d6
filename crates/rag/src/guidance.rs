//! Guided answers for ambiguous questions.
//!
//! Built deterministically from the vocabulary and configured years; no
//! model call and no retrieval.

use crate::metadata::{ExtractedMetadata, Vocabulary};
use crate::types::{Answer, MissingContext};
use esg_core::RetrievalMode;
use std::sync::Arc;

/// Topics offered when the question names none.
const DEFAULT_DATA_TOPICS: &[&str] = &["溫室氣體排放", "用電量", "用水量"];

/// Metric terms too generic to seed a suggestion.
const GENERIC_METRIC_TERMS: &[&str] = &["多少", "比例", "佔比", "數據", "數值", "指標", "金額"];

pub struct GuidanceBuilder {
    vocab: Arc<Vocabulary>,
    suggestion_years: Vec<u16>,
}

impl GuidanceBuilder {
    pub fn new(vocab: Arc<Vocabulary>, mut suggestion_years: Vec<u16>) -> Self {
        suggestion_years.sort_unstable();
        suggestion_years.dedup();
        Self {
            vocab,
            suggestion_years,
        }
    }

    pub fn guide(
        &self,
        meta: &ExtractedMetadata,
        missing: &[MissingContext],
        mode: RetrievalMode,
    ) -> Answer {
        let news_style = mode == RetrievalMode::News;

        Answer::Guided {
            question: self.question(missing, news_style),
            suggestions: if news_style {
                self.news_suggestions(meta)
            } else {
                self.data_suggestions(meta)
            },
            missing: missing.to_vec(),
        }
    }

    fn question(&self, missing: &[MissingContext], news_style: bool) -> String {
        let mode_line = if news_style {
            "目前為【新聞】模式。"
        } else {
            "目前為【ESG 指標】模式。"
        };

        let parts: Vec<&str> = missing
            .iter()
            .map(|m| match m {
                MissingContext::Company => "公司名稱或代號",
                MissingContext::Year => "年份",
                MissingContext::Topic if news_style => "新聞主題或情緒（正面/負面）",
                MissingContext::Topic => "想查的指標（例如碳排放、用電量）",
            })
            .collect();

        if parts.is_empty() {
            format!("{}請再具體描述想查詢的公司、年份與指標。", mode_line)
        } else {
            format!("{}為了精準查詢，請補充：{}。", mode_line, parts.join("、"))
        }
    }

    /// Two company names: the ones in the question first, then vocabulary order.
    fn companies(&self, meta: &ExtractedMetadata) -> Vec<String> {
        let mut names: Vec<String> = meta
            .companies
            .iter()
            .filter_map(|code| self.vocab.company(code))
            .map(|c| c.name.clone())
            .collect();
        for c in self.vocab.companies() {
            if names.len() >= 2 {
                break;
            }
            if !names.contains(&c.name) {
                names.push(c.name.clone());
            }
        }
        names.truncate(2);
        names
    }

    fn years(&self, meta: &ExtractedMetadata) -> (u16, u16) {
        let years = if meta.has_year() {
            &meta.years
        } else {
            &self.suggestion_years
        };
        match (years.first(), years.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                let (_, max) = self.vocab.year_bounds();
                (max, max)
            }
        }
    }

    fn data_suggestions(&self, meta: &ExtractedMetadata) -> Vec<String> {
        let companies = self.companies(meta);
        let (first_year, last_year) = self.years(meta);

        let mut topics: Vec<String> = meta
            .signals
            .metric_terms
            .iter()
            .filter(|t| !GENERIC_METRIC_TERMS.contains(&t.as_str()))
            .cloned()
            .collect();
        for t in DEFAULT_DATA_TOPICS {
            if topics.len() >= 2 {
                break;
            }
            if !topics.iter().any(|x| x == t) {
                topics.push(t.to_string());
            }
        }

        let lead = companies.first().map(String::as_str).unwrap_or_default();
        let span = if first_year == last_year {
            last_year.to_string()
        } else {
            format!("{}-{}", first_year, last_year)
        };

        let mut out = vec![
            join_words(&[lead, &last_year.to_string(), &topics[0]]),
            join_words(&[lead, &span, &topics[1]]),
        ];
        if let Some(second) = companies.get(1) {
            out.push(join_words(&[second, &last_year.to_string(), &topics[0]]));
        }
        out.dedup();
        out
    }

    fn news_suggestions(&self, meta: &ExtractedMetadata) -> Vec<String> {
        let companies = self.companies(meta);
        let lead = companies.first().map(String::as_str).unwrap_or_default();
        let topic = meta.category.map(|c| c.label()).unwrap_or("ESG");
        let sentiment = meta.sentiment.map(|s| s.label()).unwrap_or("負面");

        let mut out = vec![
            join_words(&[lead, topic, "新聞"]),
            join_words(&[lead, sentiment, "新聞"]),
        ];
        if let Some(second) = companies.get(1) {
            out.push(join_words(&[second, topic, "新聞"]));
        }
        out.dedup();
        out
    }
}

fn join_words(words: &[&str]) -> String {
    words
        .iter()
        .filter(|w| !w.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use esg_core::pipeline::default_companies;
    use esg_core::Sentiment;

    fn builder() -> GuidanceBuilder {
        let vocab = Arc::new(Vocabulary::new(default_companies(), 2000, 2099));
        GuidanceBuilder::new(vocab, vec![2023, 2022])
    }

    fn suggestions(answer: &Answer) -> Vec<String> {
        match answer {
            Answer::Guided { suggestions, .. } => suggestions.clone(),
            other => panic!("expected guided answer, got {:?}", other),
        }
    }

    #[test]
    fn test_data_suggestions_default() {
        let answer = builder().guide(
            &ExtractedMetadata::default(),
            &[MissingContext::Company, MissingContext::Year, MissingContext::Topic],
            RetrievalMode::All,
        );
        let s = suggestions(&answer);
        assert_eq!(
            s,
            vec![
                "台積電 2023 溫室氣體排放",
                "台積電 2022-2023 用電量",
                "鴻海 2023 溫室氣體排放",
            ]
        );
    }

    #[test]
    fn test_news_suggestions_use_question_company() {
        let meta = ExtractedMetadata {
            companies: vec!["2891".into()],
            sentiment: Some(Sentiment::Positive),
            ..Default::default()
        };
        let answer = builder().guide(&meta, &[MissingContext::Year], RetrievalMode::News);
        let s = suggestions(&answer);
        assert_eq!(s[0], "中信金 ESG 新聞");
        assert_eq!(s[1], "中信金 正面 新聞");
        assert_eq!(s[2], "台積電 ESG 新聞");
    }

    #[test]
    fn test_question_names_missing_context() {
        let answer = builder().guide(
            &ExtractedMetadata::default(),
            &[MissingContext::Company, MissingContext::Year],
            RetrievalMode::Data,
        );
        match answer {
            Answer::Guided { question, missing, .. } => {
                assert!(question.contains("公司名稱或代號"));
                assert!(question.contains("年份"));
                assert!(question.contains("ESG 指標"));
                assert_eq!(missing.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_guidance_is_deterministic() {
        let b = builder();
        let meta = ExtractedMetadata::default();
        let a1 = b.guide(&meta, &[MissingContext::Topic], RetrievalMode::Data);
        let a2 = b.guide(&meta, &[MissingContext::Topic], RetrievalMode::Data);
        assert_eq!(a1, a2);
    }
}
