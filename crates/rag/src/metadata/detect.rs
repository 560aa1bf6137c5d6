//! Detection rules for companies, years, categories, sources and signals

use super::types::QuerySignals;
use super::vocabulary::{
    contains_term, find_terms, Vocabulary, CATEGORY_TERMS, COMPARISON_TERMS, DEFINITIONAL_TERMS,
    GREETINGS, METRIC_TERMS, NEWS_SOURCE_TERMS, NEWS_TERMS, REPORT_SOURCE_TERMS, SENTIMENT_TERMS,
    VAGUE_PHRASES,
};
use esg_core::{Category, Sentiment, SourceKind};
use regex::Regex;
use std::sync::LazyLock;

/// A digit run, optionally followed by a range separator and a second run.
static YEAR_SPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+)(?:\s*[-~–至到]\s*([0-9]+))?").expect("year span regex is valid")
});

static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("digit run regex is valid"));

/// Full-width ASCII to half-width, lowercase, collapsed whitespace.
pub fn normalize_text(text: &str) -> String {
    let converted: String = text
        .chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect();

    converted
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Company codes named in the text, by surface form or by vocabulary code.
pub fn detect_companies(normalized: &str, vocab: &Vocabulary) -> Vec<String> {
    let mut codes = vocab.match_companies(normalized);
    for m in DIGIT_RUN_RE.find_iter(normalized) {
        let token = m.as_str();
        if token.len() == 4 && vocab.is_company_code(token) && !codes.iter().any(|c| c == token) {
            codes.push(token.to_string());
        }
    }
    codes
}

fn parse_year(token: &str, vocab: &Vocabulary) -> Option<u16> {
    if token.len() != 4 || vocab.is_company_code(token) {
        return None;
    }
    token.parse::<u16>().ok().filter(|y| vocab.year_in_range(*y))
}

/// Years named in the text. Ranges expand inclusively; a reversed range
/// collapses to its first year.
pub fn detect_years(normalized: &str, vocab: &Vocabulary) -> Vec<u16> {
    let mut years = Vec::new();

    for caps in YEAR_SPAN_RE.captures_iter(normalized) {
        let start = caps.get(1).and_then(|m| parse_year(m.as_str(), vocab));
        let end = caps.get(2).and_then(|m| parse_year(m.as_str(), vocab));

        match (start, end) {
            (Some(a), Some(b)) if b >= a => years.extend(a..=b),
            (Some(a), _) => years.push(a),
            (None, Some(b)) => years.push(b),
            (None, None) => {}
        }
    }

    years.sort_unstable();
    years.dedup();
    years
}

pub fn detect_category(normalized: &str) -> Option<Category> {
    CATEGORY_TERMS
        .iter()
        .find(|(term, _)| contains_term(normalized, term))
        .map(|(_, c)| *c)
}

pub fn detect_sentiment(normalized: &str) -> Option<Sentiment> {
    SENTIMENT_TERMS
        .iter()
        .find(|(term, _)| contains_term(normalized, term))
        .map(|(_, s)| *s)
}

/// Explicit source request. Mentions of both sources cancel out.
pub fn detect_source(normalized: &str) -> Option<SourceKind> {
    let report = REPORT_SOURCE_TERMS.iter().any(|t| contains_term(normalized, t));
    let news = NEWS_SOURCE_TERMS.iter().any(|t| contains_term(normalized, t));
    match (report, news) {
        (true, false) => Some(SourceKind::Report),
        (false, true) => Some(SourceKind::News),
        _ => None,
    }
}

pub fn detect_signals(normalized: &str) -> QuerySignals {
    let trimmed = normalized.trim();
    QuerySignals {
        metric_terms: find_terms(normalized, METRIC_TERMS),
        news_terms: find_terms(normalized, NEWS_TERMS),
        comparison: COMPARISON_TERMS.iter().any(|t| contains_term(normalized, t)),
        definitional: DEFINITIONAL_TERMS.iter().any(|t| contains_term(normalized, t)),
        vague: VAGUE_PHRASES.iter().any(|t| normalized.contains(t))
            || GREETINGS.contains(&trimmed),
        empty: trimmed.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esg_core::pipeline::default_companies;

    fn vocab() -> Vocabulary {
        Vocabulary::new(default_companies(), 2000, 2099)
    }

    #[test]
    fn test_normalize_full_width() {
        assert_eq!(normalize_text("ＴＳＭＣ　２０２３"), "tsmc 2023");
        assert_eq!(normalize_text("  Scope   1 "), "scope 1");
    }

    #[test]
    fn test_detect_years_single_and_range() {
        let v = vocab();
        assert_eq!(detect_years("2023年台積電", &v), vec![2023]);
        assert_eq!(detect_years("2021-2023 用電", &v), vec![2021, 2022, 2023]);
        assert_eq!(detect_years("2021至2022", &v), vec![2021, 2022]);
        assert_eq!(detect_years("2023~2021", &v), vec![2023]);
    }

    #[test]
    fn test_company_code_is_not_a_year() {
        let v = vocab();
        assert!(detect_years("2330 碳排放", &v).is_empty());
        assert_eq!(detect_companies("2330 碳排放", &v), vec!["2330"]);
    }

    #[test]
    fn test_unknown_four_digit_token_is_neither() {
        let v = vocab();
        assert!(detect_companies("9999 碳排放", &v).is_empty());
        assert!(detect_years("9999 碳排放", &v).is_empty());
        assert!(detect_years("120231", &v).is_empty());
    }

    #[test]
    fn test_detect_category_and_sentiment() {
        assert_eq!(detect_category("台積電 環境 新聞"), Some(Category::Environmental));
        assert_eq!(detect_category("公司治理"), Some(Category::Governance));
        assert_eq!(detect_sentiment("鴻海負面新聞"), Some(Sentiment::Negative));
        assert_eq!(detect_sentiment("鴻海新聞"), None);
    }

    #[test]
    fn test_detect_source() {
        assert_eq!(detect_source("永續報告書的揭露"), Some(SourceKind::Report));
        assert_eq!(detect_source("最新新聞"), Some(SourceKind::News));
        assert_eq!(detect_source("報告書和新聞"), None);
    }

    #[test]
    fn test_detect_signals() {
        let s = detect_signals("2023年台積電的碳排放量是多少");
        assert!(s.has_metric());
        assert!(!s.has_news());
        assert!(!s.vague);

        let s = detect_signals("esg是什麼");
        assert!(s.definitional);
        assert!(!s.has_metric());

        let s = detect_signals("hi");
        assert!(s.vague);
        assert!(!detect_signals("which company").vague);

        assert!(detect_signals("").empty);
        assert!(detect_signals("歷年趨勢").comparison);
    }
}
