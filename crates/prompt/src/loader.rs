//! Prompt loader for workspace prompt overrides.

use crate::templates::{builtin_prompt, prompt_id, ALL_PROMPT_ID, DATA_PROMPT_ID, NEWS_PROMPT_ID};
use crate::types::PromptDefinition;
use esg_core::{AppError, AppResult, RetrievalMode};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".esg").join("prompts")
}

/// Load a prompt definition by ID from `.esg/prompts/<id>.yml`.
///
/// # Example
/// ```no_run
/// use esg_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "esg.answer.data")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Resolve the answer prompt for a mode: the workspace override if one
/// exists, otherwise the built-in definition.
pub fn resolve_prompt(workspace_path: Option<&Path>, mode: RetrievalMode) -> AppResult<PromptDefinition> {
    let id = prompt_id(mode);
    match workspace_path {
        Some(ws) if prompts_dir(ws).join(format!("{}.yml", id)).exists() => load_prompt(ws, id),
        _ => Ok(builtin_prompt(mode)),
    }
}

/// Override files in the workspace whose id matches no built-in prompt.
/// These are never loaded.
pub fn unknown_overrides(workspace_path: &Path) -> AppResult<Vec<String>> {
    let known = [DATA_PROMPT_ID, NEWS_PROMPT_ID, ALL_PROMPT_ID];
    Ok(list_prompts(workspace_path)?
        .into_iter()
        .filter(|id| !known.contains(&id.as_str()))
        .collect())
}

/// List all prompt override IDs in the workspace.
fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    // Without the evidence block the model has nothing to cite.
    if !def.template.contains("evidence") {
        return Err(AppError::Prompt(format!(
            "Prompt template '{}' must render the evidence list",
            def.id
        )));
    }

    Ok(())
}
