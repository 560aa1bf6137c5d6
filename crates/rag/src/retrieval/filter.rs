//! Metadata filters for similarity search.

use crate::metadata::ExtractedMetadata;
use esg_core::{
    Category, ChunkMetadata, Collection, FilterField, RetrievalMode, Sentiment, SourceKind,
};
use serde::{Deserialize, Serialize};

/// Exact-match constraints on chunk metadata. Empty sets and `None` match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub companies: Vec<String>,
    pub years: Vec<u16>,
    pub category: Option<Category>,
    /// Only constrains the news collection
    pub sentiment: Option<Sentiment>,
    /// Requested source; narrows which collections a mode searches
    pub source: Option<SourceKind>,
}

impl MetadataFilter {
    pub fn from_metadata(meta: &ExtractedMetadata) -> Self {
        Self {
            companies: meta.companies.clone(),
            years: meta.years.clone(),
            category: meta.category,
            sentiment: meta.sentiment,
            source: meta.source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
            && self.years.is_empty()
            && self.category.is_none()
            && self.sentiment.is_none()
            && self.source.is_none()
    }

    /// Collections to search in `mode`.
    ///
    /// A requested source narrows the mode's collections. When the two
    /// disagree (an explicit `data` mode with a news request) the mode wins.
    pub fn collections(&self, mode: RetrievalMode) -> Vec<Collection> {
        let all = mode.collections();
        match self.source.map(|s| s.collection()) {
            Some(wanted) if all.contains(&wanted) => vec![wanted],
            _ => all.to_vec(),
        }
    }

    /// Whether the requested source actually narrows `mode`.
    fn source_narrows(&self, mode: RetrievalMode) -> bool {
        self.collections(mode).len() < mode.collections().len()
    }

    /// Whether a sentiment constraint applies to `collection`.
    pub fn sentiment_for(&self, collection: Collection) -> Option<Sentiment> {
        match collection {
            Collection::News => self.sentiment,
            Collection::EsgReport => None,
        }
    }

    /// Whether a requested source admits `collection`.
    pub fn matches_collection(&self, collection: Collection) -> bool {
        self.source.map_or(true, |s| s.collection() == collection)
    }

    pub fn matches(&self, collection: Collection, meta: &ChunkMetadata) -> bool {
        let company_ok = self.companies.is_empty()
            || meta
                .company_code
                .as_ref()
                .is_some_and(|c| self.companies.contains(c));
        let year_ok = self.years.is_empty() || meta.year.is_some_and(|y| self.years.contains(&y));
        let category_ok = self.category.is_none() || meta.category == self.category;
        let source_ok = self.matches_collection(collection);
        let sentiment_ok = match self.sentiment_for(collection) {
            Some(s) => meta.sentiment == Some(s),
            None => true,
        };
        company_ok && year_ok && category_ok && source_ok && sentiment_ok
    }

    /// Fields that currently constrain a search in `mode`.
    pub fn specified_fields(&self, mode: RetrievalMode) -> Vec<FilterField> {
        FilterField::RELAXATION_ORDER
            .into_iter()
            .filter(|f| match f {
                FilterField::Sentiment => {
                    self.sentiment.is_some() && mode.collections().contains(&Collection::News)
                }
                FilterField::Category => self.category.is_some(),
                FilterField::Source => self.source_narrows(mode),
                FilterField::Year => !self.years.is_empty(),
                FilterField::Company => !self.companies.is_empty(),
            })
            .collect()
    }

    /// Drop the least specific specified field.
    ///
    /// Order is sentiment, category, source, year, company. Sentiment only
    /// counts when the mode searches news, source only when it narrows the
    /// mode's collections.
    pub fn relax(&self, mode: RetrievalMode) -> Option<(MetadataFilter, FilterField)> {
        let field = *self.specified_fields(mode).first()?;
        let mut relaxed = self.clone();
        match field {
            FilterField::Sentiment => relaxed.sentiment = None,
            FilterField::Category => relaxed.category = None,
            FilterField::Source => relaxed.source = None,
            FilterField::Year => relaxed.years.clear(),
            FilterField::Company => relaxed.companies.clear(),
        }
        Some((relaxed, field))
    }

    /// Same filter narrowed to a single year.
    pub fn with_year(&self, year: u16) -> Self {
        Self {
            years: vec![year],
            ..self.clone()
        }
    }
}
