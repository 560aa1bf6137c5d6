//! Ask command handler.
//!
//! Runs one question through the pipeline and records the turn in the
//! session history when a session is given.

use super::parse_mode;
use clap::Args;
use esg_core::{config::AppConfig, AppError, AppResult};
use esg_rag::{Answer, EsgPipeline, Query, SessionStore, Turn};
use uuid::Uuid;

/// Ask an ESG question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Retrieval mode (all, data, news); routed automatically when omitted
    #[arg(long)]
    pub mode: Option<String>,

    /// Conversation session id; earlier turns resolve follow-up questions
    #[arg(short, long, conflicts_with = "new_session")]
    pub session: Option<String>,

    /// Start a new session and print its id
    #[arg(long)]
    pub new_session: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let mode = parse_mode(self.mode.as_deref())?;
        let sessions = SessionStore::new(config.sessions_dir());

        let session = if self.new_session {
            let id = Uuid::new_v4().to_string();
            eprintln!("Session: {}", id);
            Some(id)
        } else {
            self.session.clone()
        };

        let history = match &session {
            Some(id) => sessions.recent(id, config.pipeline.history_window)?,
            None => Vec::new(),
        };
        tracing::debug!("Loaded {} history turns", history.len());

        let mut query = Query::new(&self.question).with_history(history);
        if let Some(mode) = mode {
            query = query.with_mode(mode);
        }

        let pipeline = EsgPipeline::from_app_config(config)?;
        if !pipeline.is_ready().await {
            tracing::warn!("Evidence index is empty. Use 'esg corpus load' to populate it.");
        }

        let answer = pipeline.answer_query(&query).await;

        if self.json {
            let output = serde_json::json!({
                "session": session,
                "provider": config.provider,
                "model": config.model,
                "answer": answer,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_answer(&answer);
        }

        if let Answer::Error { message, .. } = &answer {
            return Err(AppError::Other(message.clone()));
        }

        if let Some(id) = &session {
            sessions.append(id, &Turn::new(&self.question, answer.display_text()))?;
        }

        Ok(())
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.display_text());

    match answer {
        Answer::Final {
            citations,
            unverified,
            relaxed,
            low_confidence,
            ..
        } => {
            if !citations.is_empty() {
                println!("\n來源：");
                for c in citations {
                    match &c.url {
                        Some(url) => println!("[{}] {} ({})", c.index, c.label, url),
                        None => println!("[{}] {}", c.index, c.label),
                    }
                }
            }
            if let Some(field) = relaxed {
                eprintln!("note: no exact match, the {} filter was relaxed", field.as_str());
            }
            if *low_confidence {
                eprintln!("note: retrieved evidence is only loosely related");
            }
            if *unverified {
                eprintln!("note: the answer's citations could not be fully verified");
            }
        }
        Answer::InsufficientEvidence {
            relaxed: Some(field),
            ..
        } => {
            eprintln!("note: searched again without the {} filter", field.as_str());
        }
        _ => {}
    }
}
