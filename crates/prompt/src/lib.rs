//! Context assembly for ESG answers.
//!
//! Turns ranked evidence into a structured generation prompt:
//! - deterministic evidence ordering with stable 1-based citation indices
//! - evidence-scoped directives chosen per retrieval mode
//! - Handlebars rendering of built-in or workspace-provided templates

pub mod builder;
pub mod loader;
pub mod templates;
pub mod types;

pub use builder::{assemble, assemble_with, select_directives};
pub use loader::{load_prompt, resolve_prompt, unknown_overrides};
pub use templates::{builtin_prompt, prompt_id};
pub use types::{
    BuiltPromptMetadata, CitedEvidence, Directive, GenerationPrompt, PromptDefinition,
    PromptOutputSpec, INSUFFICIENT_EVIDENCE_PHRASE,
};
