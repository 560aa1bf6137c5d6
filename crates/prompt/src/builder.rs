//! Context assembly: ranked evidence in, generation prompt out.

use crate::templates::builtin_prompt;
use crate::types::{BuiltPromptMetadata, CitedEvidence, Directive, GenerationPrompt, PromptDefinition};
use esg_core::{AppError, AppResult, Collection, RankedEvidence, RetrievalMode, ScoredEvidence};
use handlebars::Handlebars;
use serde_json::json;

/// Assemble a generation prompt with the built-in template for `mode`.
///
/// Evidence is ordered by score descending with chunk id as tie-break and
/// numbered from 1 in that order, so the same evidence always yields the
/// same citation indices.
pub fn assemble(
    query: &str,
    mode: RetrievalMode,
    evidence: &RankedEvidence,
) -> AppResult<GenerationPrompt> {
    assemble_with(&builtin_prompt(mode), query, mode, evidence)
}

/// Assemble a generation prompt with an explicit prompt definition.
pub fn assemble_with(
    definition: &PromptDefinition,
    query: &str,
    mode: RetrievalMode,
    evidence: &RankedEvidence,
) -> AppResult<GenerationPrompt> {
    tracing::debug!(prompt_id = %definition.id, items = evidence.len(), "Assembling prompt");

    let cited = cite(&evidence.items);
    let directives = select_directives(mode, evidence);

    let instructions: Vec<String> = directives
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{}) {}", i + 1, d.instruction()))
        .collect();

    let sources: Vec<String> = cited
        .iter()
        .filter(|e| e.collection == Collection::News)
        .filter_map(source_line)
        .collect();

    let context = json!({
        "query": query,
        "mode": mode.as_str(),
        "directives": instructions,
        "evidence": cited
            .iter()
            .map(|e| json!({ "index": e.index, "label": e.label, "text": e.text.trim() }))
            .collect::<Vec<_>>(),
        "sources": sources,
    });

    let system = render_template(&definition.system, &context)?;
    let user = render_template(&definition.template, &context)?;

    Ok(GenerationPrompt {
        query: query.to_string(),
        mode,
        evidence: cited,
        directives,
        system,
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            low_confidence: evidence.low_confidence,
            relaxed: evidence.relaxed,
            numeric_evidence: evidence.has_numeric(),
        },
    })
}

/// Order evidence deterministically and assign 1-based citation indices.
fn cite(items: &[ScoredEvidence]) -> Vec<CitedEvidence> {
    let mut ordered: Vec<&ScoredEvidence> = items.iter().collect();
    ordered.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, item)| CitedEvidence {
            index: i + 1,
            chunk_id: item.chunk.id.clone(),
            score: item.score,
            collection: item.chunk.collection,
            label: item.chunk.metadata.display_label(),
            text: item.chunk.text.clone(),
            metadata: item.chunk.metadata.clone(),
        })
        .collect()
}

/// Pick the directives for this mode and evidence set.
pub fn select_directives(mode: RetrievalMode, evidence: &RankedEvidence) -> Vec<Directive> {
    let mut directives = vec![Directive::EvidenceOnly, Directive::CiteEveryClaim];

    let wants_data = matches!(mode, RetrievalMode::Data | RetrievalMode::All);
    let has_reports = evidence
        .items
        .iter()
        .any(|e| e.chunk.collection == Collection::EsgReport);
    let has_news = evidence
        .items
        .iter()
        .any(|e| e.chunk.collection == Collection::News);

    if wants_data && evidence.has_numeric() {
        directives.push(Directive::NumericTable);
    }
    if wants_data && has_reports {
        directives.push(Directive::DataFormatting);
    }
    if matches!(mode, RetrievalMode::News | RetrievalMode::All) && has_news {
        directives.push(Directive::NewsDigest);
    }

    directives.push(Directive::DeclareInsufficiency);

    if evidence.low_confidence {
        directives.push(Directive::CautiousLanguage);
    }
    if evidence.relaxed.is_some() {
        directives.push(Directive::RelaxedScope);
    }

    directives
}

/// `title｜company｜sentiment｜url` line for the news source list.
fn source_line(e: &CitedEvidence) -> Option<String> {
    let m = &e.metadata;
    if m.title.is_none() && m.url.is_none() {
        return None;
    }
    Some(format!(
        "[{}] {}｜{}｜{}｜{}",
        e.index,
        m.title.as_deref().unwrap_or(""),
        m.company_name.as_deref().unwrap_or(""),
        m.sentiment.map(|s| s.label()).unwrap_or(""),
        m.url.as_deref().unwrap_or("")
    ))
}

/// Render a Handlebars template against a JSON context.
fn render_template(template: &str, context: &serde_json::Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", context)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
