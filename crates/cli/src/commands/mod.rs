//! Command handlers for the ESG CLI.

pub mod ask;
pub mod corpus;
pub mod route;

pub use ask::AskCommand;
pub use corpus::CorpusCommand;
pub use route::RouteCommand;

use esg_core::{AppError, AppResult, RetrievalMode};

/// Parse a `--mode` flag value.
pub(crate) fn parse_mode(mode: Option<&str>) -> AppResult<Option<RetrievalMode>> {
    mode.map(|m| {
        RetrievalMode::parse(m).ok_or_else(|| {
            AppError::Config(format!("Unknown mode: {}. Supported: all, data, news", m))
        })
    })
    .transpose()
}
