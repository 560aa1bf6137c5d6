//! Answer generation and output validation.
//!
//! Model output is untrusted: every `[n]` citation is checked against the
//! evidence the prompt actually carried. Unknown indices are stripped and the
//! answer is flagged `unverified` instead of failing the run.

use crate::types::{Answer, Citation, ErrorKind};
use esg_core::{AppError, AppResult, PipelineConfig};
use esg_llm::{LlmClient, LlmRequest};
use esg_prompt::{GenerationPrompt, INSUFFICIENT_EVIDENCE_PHRASE};
use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// `[1]`, `[1, 3]`, `[2，4]`, `[1、2]`
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\s*\d+(?:\s*[,，、]\s*\d+)*\s*)\]").expect("citation pattern is valid")
});

static INDEX_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[,，、]\s*").expect("separator pattern is valid"));

pub struct AnswerGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self::from_config(client, model, &PipelineConfig::default())
    }

    pub fn from_config(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.generation_timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the prompt and turn the output into a final answer, or an error
    /// answer when the backend fails or times out.
    #[instrument(skip_all, fields(model = %self.model, evidence = prompt.evidence.len()))]
    pub async fn generate(&self, prompt: &GenerationPrompt) -> Answer {
        match self.complete(prompt).await {
            Ok(raw) => parse_answer(&raw, prompt),
            Err(err) => {
                warn!("Generation failed: {}", err);
                Answer::from_error(ErrorKind::for_generation(&err), &err)
            }
        }
    }

    /// One bounded generation call.
    pub async fn complete(&self, prompt: &GenerationPrompt) -> AppResult<String> {
        let request = LlmRequest::new(prompt.user.clone(), self.model.clone())
            .with_system(prompt.system.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = tokio::time::timeout(self.timeout, self.client.complete(&request))
            .await
            .map_err(|_| AppError::GenerationTimeout(self.timeout.as_secs()))??;

        info!(
            provider = self.client.provider_name(),
            tokens = response.usage.total_tokens,
            "Generation complete"
        );

        if response.content.trim().is_empty() {
            return Err(AppError::Llm("Generation returned no content".to_string()));
        }
        Ok(response.content)
    }
}

/// Validate citations in `raw` against `prompt` and build the final answer.
pub fn parse_answer(raw: &str, prompt: &GenerationPrompt) -> Answer {
    let mut cited: Vec<usize> = Vec::new();
    let mut invalid: BTreeSet<String> = BTreeSet::new();

    let text = CITATION_RE.replace_all(raw.trim(), |caps: &Captures| {
        let mut kept = Vec::new();
        for part in INDEX_SEPARATOR_RE.split(caps[1].trim()) {
            let digits = ascii_digits(part);
            let Ok(index) = digits.parse::<usize>() else {
                invalid.insert(part.to_string());
                continue;
            };
            if prompt.citation(index).is_some() {
                if !kept.contains(&index) {
                    kept.push(index);
                }
                if !cited.contains(&index) {
                    cited.push(index);
                }
            } else {
                invalid.insert(index.to_string());
            }
        }

        if kept.is_empty() {
            String::new()
        } else {
            let joined: Vec<String> = kept.iter().map(|i| i.to_string()).collect();
            format!("[{}]", joined.join(", "))
        }
    });
    let text = text.trim().to_string();

    if !invalid.is_empty() {
        warn!(?invalid, "Stripped citations to evidence the prompt did not carry");
    }

    let citations: Vec<Citation> = cited
        .into_iter()
        .filter_map(|index| prompt.citation(index))
        .map(|e| Citation {
            index: e.index,
            chunk_id: e.chunk_id.clone(),
            collection: e.collection,
            label: e.label.clone(),
            url: e.metadata.url.clone(),
        })
        .collect();

    let admits_gap = text.contains(INSUFFICIENT_EVIDENCE_PHRASE);
    let unverified = !invalid.is_empty() || (citations.is_empty() && !admits_gap);

    Answer::Final {
        tables: extract_tables(&text),
        text,
        citations,
        mode: prompt.mode,
        unverified,
        relaxed: prompt.metadata.relaxed,
        low_confidence: prompt.metadata.low_confidence,
    }
}

/// Full-width digits (`０`-`９`) folded to ASCII; anything else is kept so it
/// fails to parse.
fn ascii_digits(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            other => other,
        })
        .collect()
}

/// Markdown tables: runs of two or more consecutive lines starting with `|`.
pub fn extract_tables(text: &str) -> Vec<String> {
    let mut tables = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines().chain(std::iter::once("")) {
        let trimmed = line.trim();
        if trimmed.starts_with('|') {
            current.push(trimmed);
            continue;
        }
        if current.len() >= 2 {
            tables.push(current.join("\n"));
        }
        current.clear();
    }

    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{evidence, ScriptedLlm};
    use async_trait::async_trait;
    use esg_core::{Collection, RetrievalMode};
    use esg_llm::LlmResponse;

    fn prompt() -> GenerationPrompt {
        let ranked = evidence(vec![
            ("r1", Collection::EsgReport, 0.9),
            ("r2", Collection::EsgReport, 0.8),
        ]);
        esg_prompt::assemble("台積電 2023 碳排放", RetrievalMode::Data, &ranked).unwrap()
    }

    #[test]
    fn test_valid_citations_are_resolved() {
        let p = prompt();
        let answer = parse_answer("範疇一排放量為 100 公噸 [1]，範疇二為 200 公噸 [2]。", &p);
        match answer {
            Answer::Final {
                citations,
                unverified,
                ..
            } => {
                assert!(!unverified);
                let ids: Vec<_> = citations.iter().map(|c| c.chunk_id.as_str()).collect();
                assert_eq!(ids, vec!["r1", "r2"]);
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[test]
    fn test_invalid_citations_are_stripped() {
        let p = prompt();
        let answer = parse_answer("數值為 5 [1, 7]，另見 [9]。", &p);
        match answer {
            Answer::Final {
                text,
                citations,
                unverified,
                ..
            } => {
                assert!(unverified);
                assert_eq!(citations.len(), 1);
                assert!(text.contains("[1]"));
                assert!(!text.contains('7'));
                assert!(!text.contains("[9]"));
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[test]
    fn test_full_width_citation_digits() {
        let p = prompt();
        let answer = parse_answer("範疇一為 100 [１]，範疇二為 200 [２]。", &p);
        match answer {
            Answer::Final {
                text,
                citations,
                unverified,
                ..
            } => {
                assert!(!unverified);
                assert_eq!(citations.len(), 2);
                assert!(text.contains("[1]") && text.contains("[2]"));
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[test]
    fn test_unresolvable_citation_marks_answer_unverified() {
        let p = prompt();
        for raw in [
            "A 為 100 [1]，B 為 200 [99999999999999999999]。",
            "A 為 100 [1]，B 為 200 [٣]。",
            "A 為 100 [1]，B 為 200 [３]。",
        ] {
            match parse_answer(raw, &p) {
                Answer::Final {
                    text,
                    citations,
                    unverified,
                    ..
                } => {
                    assert!(unverified, "{raw}");
                    assert_eq!(citations.len(), 1);
                    assert!(!text.contains("999"));
                    assert!(!text.contains('٣'));
                    assert!(!text.contains('３'));
                }
                other => panic!("unexpected answer {:?}", other),
            }
        }
    }

    #[test]
    fn test_full_width_separators() {
        let p = prompt();
        let answer = parse_answer("兩年皆有揭露 [1，2]", &p);
        assert_eq!(answer.citations().len(), 2);
    }

    #[test]
    fn test_uncited_answer_is_unverified_unless_it_admits_a_gap() {
        let p = prompt();
        match parse_answer("排放量逐年下降。", &p) {
            Answer::Final { unverified, .. } => assert!(unverified),
            other => panic!("unexpected answer {:?}", other),
        }
        match parse_answer("資料不足，無法回答。", &p) {
            Answer::Final { unverified, .. } => assert!(!unverified),
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[test]
    fn test_extract_tables() {
        let text = "摘要\n| 年度 | 數值 |\n|---|---|\n| 2023 | 100 |\n\n結論 [1]\n| 單行 |";
        let tables = extract_tables(text);
        assert_eq!(tables.len(), 1);
        assert!(tables[0].starts_with("| 年度"));
        assert_eq!(tables[0].lines().count(), 3);
    }

    #[tokio::test]
    async fn test_generate_final_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            "| 年度 | 範疇一 |\n|---|---|\n| 2023 | 100 [1] |".to_string()
        )]));
        let generator = AnswerGenerator::new(llm.clone(), "test-model");
        let answer = generator.generate(&prompt()).await;

        match answer {
            Answer::Final { tables, mode, .. } => {
                assert_eq!(tables.len(), 1);
                assert_eq!(mode, RetrievalMode::Data);
            }
            other => panic!("unexpected answer {:?}", other),
        }
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_is_retryable() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(AppError::Llm("503".into()))]));
        let answer = AnswerGenerator::new(llm, "test-model")
            .generate(&prompt())
            .await;
        match answer {
            Answer::Error {
                error, retryable, ..
            } => {
                assert_eq!(error, ErrorKind::GenerationBackendError);
                assert!(retryable);
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_output_is_backend_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok("   ".to_string())]));
        let answer = AnswerGenerator::new(llm, "test-model")
            .generate(&prompt())
            .await;
        assert_eq!(answer.kind_name(), "error");
    }

    struct StalledLlm;

    #[async_trait]
    impl LlmClient for StalledLlm {
        fn provider_name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(LlmResponse {
                content: "[1]".to_string(),
                model: request.model.clone(),
                usage: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn test_timeout_fails_closed() {
        let answer = AnswerGenerator::new(Arc::new(StalledLlm), "test-model")
            .with_timeout(Duration::from_millis(20))
            .generate(&prompt())
            .await;
        match answer {
            Answer::Error {
                error, retryable, ..
            } => {
                assert_eq!(error, ErrorKind::GenerationTimeout);
                assert!(retryable);
            }
            other => panic!("unexpected answer {:?}", other),
        }
    }
}
