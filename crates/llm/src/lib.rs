//! Generation capability for the ESG pipeline.
//!
//! A provider-agnostic `LlmClient` trait with two implementations:
//! - **Ollama**: local runtime (default)
//! - **OpenAI**: chat completions API or any compatible server
//!
//! # Example
//! ```no_run
//! use esg_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("台積電 2023 年碳排放", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::ProviderType;
