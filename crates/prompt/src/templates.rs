//! Built-in answer prompts, one per retrieval mode.
//!
//! Workspaces can override any of these by dropping a YAML definition with
//! the same id under `.esg/prompts/`.

use crate::types::{PromptDefinition, PromptOutputSpec};
use esg_core::RetrievalMode;

pub const DATA_PROMPT_ID: &str = "esg.answer.data";
pub const NEWS_PROMPT_ID: &str = "esg.answer.news";
pub const ALL_PROMPT_ID: &str = "esg.answer.all";

const DATA_SYSTEM: &str = "你是一位 ESG 數據整理助理，負責回答企業永續報告書中揭露的指標。
請以繁體中文回答，重點與指標名稱以粗體呈現。
回覆規則：
{{#each directives}}{{this}}
{{/each}}";

const NEWS_SYSTEM: &str = "你是一位 ESG 新聞助理，負責整理與企業永續相關的新聞報導。
請以繁體中文回答，務必做好排版、重點加粗、換行。
回覆規則：
{{#each directives}}{{this}}
{{/each}}";

const ALL_SYSTEM: &str = "你是一位 ESG 研究助理，同時參考永續報告書數據與新聞報導回答問題。
請以繁體中文回答，先呈現報告書數據，再補充相關新聞。
回覆規則：
{{#each directives}}{{this}}
{{/each}}";

const USER_TEMPLATE: &str = "{{#if sources}}【新聞來源清單】
{{#each sources}}- {{this}}
{{/each}}
{{/if}}【檢索到的內容】
{{#each evidence}}[{{index}}] {{label}}
{{text}}
{{#unless @last}}---
{{/unless}}{{/each}}

【使用者問題】
{{query}}
";

/// Prompt id used for a retrieval mode.
pub fn prompt_id(mode: RetrievalMode) -> &'static str {
    match mode {
        RetrievalMode::Data => DATA_PROMPT_ID,
        RetrievalMode::News => NEWS_PROMPT_ID,
        RetrievalMode::All => ALL_PROMPT_ID,
    }
}

/// The built-in definition for a retrieval mode.
pub fn builtin_prompt(mode: RetrievalMode) -> PromptDefinition {
    let (title, system) = match mode {
        RetrievalMode::Data => ("ESG data answer", DATA_SYSTEM),
        RetrievalMode::News => ("ESG news answer", NEWS_SYSTEM),
        RetrievalMode::All => ("ESG combined answer", ALL_SYSTEM),
    };

    PromptDefinition {
        id: prompt_id(mode).to_string(),
        title: title.to_string(),
        api_version: "1.0".to_string(),
        system: system.to_string(),
        template: USER_TEMPLATE.to_string(),
        output: PromptOutputSpec::default(),
    }
}
