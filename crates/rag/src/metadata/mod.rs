//! Metadata extraction for ESG questions
//!
//! Recognises companies, fiscal years, ESG category, requested source and
//! news sentiment over a closed vocabulary, plus the routing/classification
//! signals carried alongside them.

mod detect;
mod extractor;
mod types;
mod vocabulary;

pub use detect::{detect_companies, detect_years, normalize_text};
pub use extractor::{LlmExtractor, MetadataExtractor, RuleBasedExtractor};
pub use types::{ExtractedMetadata, QuerySignals};
pub use vocabulary::{contains_term, Vocabulary};
