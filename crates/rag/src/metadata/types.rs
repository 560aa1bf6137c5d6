//! Extracted query metadata

use esg_core::{Category, FilterField, Sentiment, SourceKind};
use serde::{Deserialize, Serialize};

/// Cues detected in the query text. Used for classification and routing,
/// never as retrieval filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySignals {
    /// Numeric or field-sounding terms ("碳排放", "用水", "多少")
    pub metric_terms: Vec<String>,

    /// News or topic terms ("新聞", "爭議", "負面")
    pub news_terms: Vec<String>,

    /// Comparison or trend markers ("比較", "趨勢")
    pub comparison: bool,

    /// Definitional shape ("是什麼", "what is")
    pub definitional: bool,

    /// Vague or greeting phrasing ("可以查什麼", "你好")
    pub vague: bool,

    /// Query was empty after trimming
    pub empty: bool,
}

impl QuerySignals {
    pub fn has_metric(&self) -> bool {
        !self.metric_terms.is_empty()
    }

    pub fn has_news(&self) -> bool {
        !self.news_terms.is_empty()
    }
}

/// Filter keys parsed out of a query. Empty sets and `None` mean unspecified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    /// Company codes, sorted and unique
    pub companies: Vec<String>,

    /// Fiscal years, sorted and unique
    pub years: Vec<u16>,

    pub category: Option<Category>,

    pub source: Option<SourceKind>,

    /// Applies to the news collection only
    pub sentiment: Option<Sentiment>,

    pub signals: QuerySignals,

    /// Fields filled from conversation history rather than the query itself
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub carried: Vec<FilterField>,
}

impl ExtractedMetadata {
    pub fn has_company(&self) -> bool {
        !self.companies.is_empty()
    }

    pub fn has_year(&self) -> bool {
        !self.years.is_empty()
    }

    /// Whether a filter field carries a value.
    pub fn is_specified(&self, field: FilterField) -> bool {
        match field {
            FilterField::Sentiment => self.sentiment.is_some(),
            FilterField::Category => self.category.is_some(),
            FilterField::Source => self.source.is_some(),
            FilterField::Year => self.has_year(),
            FilterField::Company => self.has_company(),
        }
    }

    /// Fill unspecified company/year from an earlier turn's metadata.
    ///
    /// Values named in the current query always win.
    pub fn carry_forward(&mut self, prior: &ExtractedMetadata) {
        if !self.has_company() && prior.has_company() {
            self.companies = prior.companies.clone();
            self.carried.push(FilterField::Company);
        }
        if !self.has_year() && prior.has_year() {
            self.years = prior.years.clone();
            self.carried.push(FilterField::Year);
        }
    }

    pub(crate) fn normalize(&mut self) {
        self.companies.sort();
        self.companies.dedup();
        self.years.sort_unstable();
        self.years.dedup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_forward_fills_only_missing() {
        let prior = ExtractedMetadata {
            companies: vec!["2330".into()],
            years: vec![2023],
            ..Default::default()
        };

        let mut current = ExtractedMetadata {
            years: vec![2022],
            ..Default::default()
        };
        current.carry_forward(&prior);

        assert_eq!(current.companies, vec!["2330"]);
        assert_eq!(current.years, vec![2022]);
        assert_eq!(current.carried, vec![FilterField::Company]);
    }

    #[test]
    fn test_is_specified() {
        let meta = ExtractedMetadata {
            sentiment: Some(Sentiment::Negative),
            ..Default::default()
        };
        assert!(meta.is_specified(FilterField::Sentiment));
        assert!(!meta.is_specified(FilterField::Company));
        assert!(!meta.is_specified(FilterField::Year));
    }
}
