//! Trigram embedding provider with CJK-aware features.

use crate::embeddings::provider::EmbeddingProvider;
use esg_core::AppResult;
use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them",
];

/// Trigram-based embedding provider for local, offline operation.
///
/// Latin words contribute the whole word plus character trigrams. Han and
/// kana runs have no spaces, so they contribute character unigrams and
/// bigrams instead. Not semantically accurate like a neural model, but
/// deterministic and content-dependent.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Script {
    Cjk,
    Word,
    Other,
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF   // kana
        | 0x3400..=0x4DBF // CJK ext A
        | 0x4E00..=0x9FFF // CJK unified
        | 0xF900..=0xFAFF // compatibility
        | 0xAC00..=0xD7AF // hangul
    )
}

fn classify(grapheme: &str) -> Script {
    match grapheme.chars().next() {
        Some(c) if is_cjk(c) => Script::Cjk,
        Some(c) if c.is_alphanumeric() => Script::Word,
        _ => Script::Other,
    }
}

fn fold_hash(s: &str, mul: u64) -> u64 {
    s.bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(mul).wrapping_add(b as u64))
}

impl TrigramProvider {
    /// Create a new trigram provider with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Split into runs of same-script graphemes.
    fn runs(text: &str) -> Vec<(Script, Vec<&str>)> {
        let mut runs: Vec<(Script, Vec<&str>)> = Vec::new();
        for g in text.graphemes(true) {
            let script = classify(g);
            match runs.last_mut() {
                Some((s, run)) if *s == script => run.push(g),
                _ => runs.push((script, vec![g])),
            }
        }
        runs.retain(|(s, _)| *s != Script::Other);
        runs
    }

    fn features(&self, text: &str) -> HashMap<String, f32> {
        let lower = text.to_lowercase();
        let mut features: HashMap<String, f32> = HashMap::new();

        for (script, run) in Self::runs(&lower) {
            match script {
                Script::Cjk => {
                    for g in &run {
                        *features.entry(format!("u:{}", g)).or_insert(0.0) += 0.5;
                    }
                    for pair in run.windows(2) {
                        *features.entry(format!("b:{}{}", pair[0], pair[1])).or_insert(0.0) += 1.0;
                    }
                }
                Script::Word => {
                    let word: String = run.concat();
                    if word.len() <= 1 || STOP_WORDS.contains(&word.as_str()) {
                        continue;
                    }
                    *features.entry(format!("w:{}", word)).or_insert(0.0) += 1.0;
                    for tri in run.windows(3) {
                        *features.entry(format!("t:{}", tri.concat())).or_insert(0.0) += 1.0;
                    }
                }
                Script::Other => {}
            }
        }

        features
    }

    /// Generate a trigram-based embedding for text.
    fn generate_trigram_embedding(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut embedding = vec![0.0; self.dimensions];
        if self.dimensions == 0 {
            return Ok(embedding);
        }

        for (feature, weight) in self.features(text) {
            let idx = (fold_hash(&feature, 37) as usize) % self.dimensions;
            // sqrt scale keeps repeated terms from dominating
            embedding[idx] += weight.sqrt();
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        Ok(embedding)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| self.generate_trigram_embedding(text))
            .collect()
    }
}
