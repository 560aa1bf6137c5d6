//! Corpus command handler.
//!
//! Loads report rows and news articles into the workspace index and reports
//! what the index holds.

use clap::{Args, Subcommand};
use esg_core::{config::AppConfig, AppError, AppResult};
use esg_rag::{create_provider, CorpusLoader, LoadReport, SqliteVectorStore, Vocabulary};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Evidence corpus management
#[derive(Args, Debug)]
pub struct CorpusCommand {
    #[command(subcommand)]
    pub action: CorpusAction,
}

#[derive(Subcommand, Debug)]
pub enum CorpusAction {
    /// Embed and index report rows and news articles (JSON Lines)
    Load(CorpusLoadCommand),
    /// Show index statistics
    Stats(CorpusStatsCommand),
}

impl CorpusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            CorpusAction::Load(cmd) => cmd.execute(config).await,
            CorpusAction::Stats(cmd) => cmd.execute(config).await,
        }
    }
}

/// Load corpus files
#[derive(Args, Debug)]
pub struct CorpusLoadCommand {
    /// Report rows, one JSON object per line
    #[arg(long)]
    pub reports: Option<PathBuf>,

    /// News articles, one JSON object per line
    #[arg(long)]
    pub news: Option<PathBuf>,

    /// Clear the index before loading
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusLoadCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing corpus load command");

        if self.reports.is_none() && self.news.is_none() {
            return Err(AppError::Config(
                "Nothing to load: pass --reports and/or --news".to_string(),
            ));
        }
        config.validate()?;

        let store = Arc::new(SqliteVectorStore::open(&config.index_path())?);
        if self.reset {
            tracing::info!("Resetting index at {:?}", config.index_path());
            store.reset()?;
        }

        let embedder = create_provider(
            &config.embedding,
            config.resolve_api_key("openai").as_deref(),
        )?;
        let vocab = Arc::new(Vocabulary::from_config(&config.pipeline));
        let loader = CorpusLoader::new(store.clone(), embedder, vocab);

        let started = Instant::now();
        let mut total = LoadReport::default();

        if let Some(path) = &self.reports {
            let report = loader.load_reports(path).await?;
            tracing::info!("Reports: {:?}", report);
            total.merge(report);
        }
        if let Some(path) = &self.news {
            let report = loader.load_news(path).await?;
            tracing::info!("News: {:?}", report);
            total.merge(report);
        }

        let duration = started.elapsed().as_secs_f64();

        if self.json {
            let output = serde_json::json!({
                "records": total.records,
                "invalid": total.invalid,
                "chunks": total.chunks,
                "inserted": total.inserted,
                "skipped": total.skipped,
                "durationSecs": duration,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Loaded {} records ({} invalid): {} chunks, {} inserted, {} already indexed, in {:.2}s",
                total.records, total.invalid, total.chunks, total.inserted, total.skipped, duration
            );
        }

        Ok(())
    }
}

/// Show index statistics
#[derive(Args, Debug)]
pub struct CorpusStatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusStatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing corpus stats command");

        let index_path = config.index_path();
        let store = SqliteVectorStore::open(&index_path)?;
        let stats = store.stats()?;
        let signature = store.signature()?;
        let ready = stats.total > 0;

        if self.json {
            let output = serde_json::json!({
                "index": index_path,
                "ready": ready,
                "embedding": signature,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!("Index:      {}", index_path.display());
        println!("Ready:      {}", if ready { "yes" } else { "no" });
        println!(
            "Embedding:  {}",
            signature.as_deref().unwrap_or("(none recorded)")
        );
        println!("Chunks:     {}", stats.total);
        println!("  reports:  {}", stats.reports);
        println!("  news:     {}", stats.news);
        println!("Companies:  {}", stats.companies);
        let years: Vec<String> = stats.years.iter().map(|y| y.to_string()).collect();
        println!("Years:      {}", years.join(", "));

        Ok(())
    }
}
