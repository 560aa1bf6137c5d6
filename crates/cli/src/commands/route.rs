//! Route command handler.

use super::parse_mode;
use clap::Args;
use esg_core::{config::AppConfig, AppResult};
use esg_rag::{EsgPipeline, Query};

/// Show the retrieval mode a question would be answered in
#[derive(Args, Debug)]
pub struct RouteCommand {
    /// The question to route
    pub question: String,

    /// Explicit mode; always wins over routing
    #[arg(long)]
    pub mode: Option<String>,
}

impl RouteCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing route command");

        let mut query = Query::new(&self.question);
        if let Some(mode) = parse_mode(self.mode.as_deref())? {
            query = query.with_mode(mode);
        }

        let pipeline = EsgPipeline::from_app_config(config)?;
        let mode = pipeline.route_mode(&query).await;
        println!("{}", mode);

        Ok(())
    }
}
