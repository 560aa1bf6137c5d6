//! Evidence retrieval: metadata filters, result merging and the
//! multi-variant retriever.

mod filter;
mod merge;
mod retriever;

pub use filter::MetadataFilter;
pub use merge::{rank, select_top_k, HitPool};
pub use retriever::{Retriever, RetrieverSettings};
