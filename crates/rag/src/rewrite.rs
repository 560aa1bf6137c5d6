//! Query rewriting into retrieval-optimised form.
//!
//! Rewriting normalises the text, strips the company and year tokens that
//! already travel as filters, drops pronouns and filler, and canonicalises
//! abbreviations. Output tokens are space separated and every alias target
//! maps to itself, so rewriting a rewritten query changes nothing.

use crate::metadata::{normalize_text, ExtractedMetadata, Vocabulary};
use crate::types::Turn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

/// Core used when nothing survives stripping and history cannot help.
pub const FALLBACK_CORE: &str = "esg 永續";

static YEAR_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+)(?:\s*[-~–至到]\s*([0-9]+))?\s*(?:年度|年)?")
        .expect("year token regex is valid")
});

/// Characters treated as token separators.
const PUNCTUATION: &[char] = &[
    ',', '.', '?', '!', ':', ';', '"', '\'', '(', ')', '[', ']', '{', '}', '/', '\\', '|', '*',
    '#', '、', '，', '。', '？', '！', '：', '；', '「', '」', '『', '』', '（', '）', '【', '】',
    '《', '》', '…', '～',
];

/// Pronouns, question words and particles removed as substrings.
const FILLER: &[&str] = &[
    "請問", "請告訴我", "告訴我", "幫我查", "幫我看", "幫我", "我想知道", "想知道", "想查",
    "是多少", "有多少", "多少", "是什麼", "為何", "如何", "怎麼樣", "該公司", "這家公司",
    "這間公司", "他們的", "它們的", "他們", "它們", "它的", "它", "那麼", "那", "的", "呢",
    "嗎", "吧", "請",
];

/// English filler removed as whole tokens.
const STOPWORDS: &[&str] = &[
    "what", "is", "are", "was", "were", "the", "of", "a", "an", "for", "in", "please", "how",
    "much", "many", "does", "do", "did", "it", "its", "their", "they", "about", "show", "me",
    "tell", "to", "and",
];

/// Alias table. Every target also appears as its own key.
const ALIASES: &[(&str, &str)] = &[
    ("碳排放", "碳排放"),
    ("碳排", "碳排放"),
    ("溫室氣體", "溫室氣體"),
    ("ghg", "溫室氣體"),
    ("二氧化碳", "二氧化碳"),
    ("co2e", "二氧化碳"),
    ("co2", "二氧化碳"),
    ("範疇一", "範疇一"),
    ("範疇二", "範疇二"),
    ("範疇三", "範疇三"),
    ("scope 1", "範疇一"),
    ("scope 2", "範疇二"),
    ("scope 3", "範疇三"),
    ("scope1", "範疇一"),
    ("scope2", "範疇二"),
    ("scope3", "範疇三"),
    ("再生能源", "再生能源"),
    ("綠電", "再生能源"),
    ("用電量", "用電量"),
    ("用電", "用電量"),
    ("耗電", "用電量"),
    ("用水量", "用水量"),
    ("用水", "用水量"),
    ("耗水", "用水量"),
    ("廢棄物", "廢棄物"),
    ("垃圾", "廢棄物"),
    ("員工人數", "員工人數"),
    ("員工數", "員工人數"),
    ("獨立董事", "獨立董事"),
    ("獨董", "獨立董事"),
    ("職業災害", "職業災害"),
    ("職災", "職業災害"),
    ("企業社會責任", "企業社會責任"),
    ("csr", "企業社會責任"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrittenQuery {
    pub text: String,
    /// True when the core was empty and a fallback was substituted
    pub fallback: bool,
}

pub struct QueryRewriter {
    vocab: Arc<Vocabulary>,
    /// (key chars, target), longest key first
    aliases: Vec<(Vec<char>, &'static str)>,
}

impl QueryRewriter {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        let mut aliases: Vec<(Vec<char>, &'static str)> = ALIASES
            .iter()
            .map(|(k, v)| (k.chars().collect(), *v))
            .collect();
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            vocab,
            aliases,
        }
    }

    /// Rewrite a single question.
    pub fn rewrite(&self, text: &str, meta: &ExtractedMetadata) -> RewrittenQuery {
        let core = self.core(text);
        if core.is_empty() {
            return RewrittenQuery {
                text: Self::fallback(meta),
                fallback: true,
            };
        }
        RewrittenQuery {
            text: core,
            fallback: false,
        }
    }

    /// Rewrite with ellipsis resolution: an empty core borrows the core of
    /// the most recent user turn that had one.
    pub fn rewrite_in_context(
        &self,
        text: &str,
        meta: &ExtractedMetadata,
        history: &[Turn],
    ) -> RewrittenQuery {
        let rewritten = self.rewrite(text, meta);
        if !rewritten.fallback {
            return rewritten;
        }

        for turn in history.iter().rev() {
            let core = self.core(&turn.user);
            if !core.is_empty() {
                tracing::debug!(core = %core, "Resolved ellipsis from history");
                return RewrittenQuery {
                    text: core,
                    fallback: false,
                };
            }
        }

        rewritten
    }

    /// Rewrite with metadata from the rule-based extractor.
    #[cfg(test)]
    fn rewrite_plain(&self, text: &str) -> RewrittenQuery {
        let meta = crate::metadata::RuleBasedExtractor::new(self.vocab.clone()).parse(text);
        self.rewrite(text, &meta)
    }

    fn fallback(meta: &ExtractedMetadata) -> String {
        match meta.category {
            Some(category) => category.label().to_string(),
            None => FALLBACK_CORE.to_string(),
        }
    }

    fn core(&self, text: &str) -> String {
        let mut s = normalize_text(text);

        s = s
            .chars()
            .map(|c| if PUNCTUATION.contains(&c) { ' ' } else { c })
            .collect();

        for form in self.vocab.surface_forms() {
            if !form.is_empty() {
                s = replace_term(&s, form);
            }
        }

        s = YEAR_TOKEN_RE
            .replace_all(&s, |caps: &regex::Captures| {
                let strip = |m: Option<regex::Match>| {
                    m.map(|m| m.as_str()).is_some_and(|t| {
                        t.len() == 4
                            && (self.vocab.is_company_code(t)
                                || t.parse::<u16>().is_ok_and(|y| self.vocab.year_in_range(y)))
                    })
                };
                if strip(caps.get(1)) || strip(caps.get(2)) {
                    " ".to_string()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();

        for filler in FILLER {
            s = s.replace(filler, " ");
        }

        let canonical = self.canonicalize(&s);

        let mut tokens: Vec<&str> = Vec::new();
        for token in canonical.split_whitespace() {
            if STOPWORDS.contains(&token) || tokens.contains(&token) {
                continue;
            }
            tokens.push(token);
        }
        tokens.join(" ")
    }

    /// Longest-match alias replacement; each replacement becomes its own token.
    fn canonicalize(&self, s: &str) -> String {
        let chars: Vec<char> = s.chars().collect();
        let mut out = String::with_capacity(s.len());
        let mut i = 0;

        'scan: while i < chars.len() {
            for (key, target) in &self.aliases {
                if chars[i..].starts_with(key) && self.on_boundary(&chars, i, key.len()) {
                    out.push(' ');
                    out.push_str(target);
                    out.push(' ');
                    i += key.len();
                    continue 'scan;
                }
            }
            out.push(chars[i]);
            i += 1;
        }
        out
    }

    /// ASCII keys must not match inside a longer ASCII word.
    fn on_boundary(&self, chars: &[char], start: usize, len: usize) -> bool {
        if !chars[start].is_ascii_alphanumeric() {
            return true;
        }
        let before = start.checked_sub(1).map(|j| chars[j]);
        let after = chars.get(start + len).copied();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    }
}

/// Replace every occurrence of `term` with a space, honouring ASCII word
/// boundaries.
fn replace_term(s: &str, term: &str) -> String {
    if !term.chars().all(|c| c.is_ascii()) {
        return s.replace(term, " ");
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for (start, _) in s.match_indices(term) {
        if start < last {
            continue;
        }
        let end = start + term.len();
        let before = s[..start].chars().next_back();
        let after = s[end..].chars().next();
        if before.is_some_and(|c| c.is_ascii_alphanumeric())
            || after.is_some_and(|c| c.is_ascii_alphanumeric())
        {
            continue;
        }
        out.push_str(&s[last..start]);
        out.push(' ');
        last = end;
    }
    out.push_str(&s[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::RuleBasedExtractor;
    use esg_core::pipeline::default_companies;
    use esg_core::Category;

    fn rewriter() -> QueryRewriter {
        QueryRewriter::new(Arc::new(Vocabulary::new(default_companies(), 2000, 2099)))
    }

    #[test]
    fn test_strips_entities_and_filler() {
        let r = rewriter();
        let out = r.rewrite_plain("2023年台積電的碳排放量是多少？");
        assert_eq!(out.text, "碳排放 量");
        assert!(!out.fallback);
    }

    #[test]
    fn test_alias_expansion() {
        let r = rewriter();
        assert_eq!(r.rewrite_plain("TSMC GHG scope 1").text, "溫室氣體 範疇一");
        assert_eq!(r.rewrite_plain("鴻海 碳排").text, "碳排放");
        assert_eq!(r.rewrite_plain("2330 綠電 用電").text, "再生能源 用電量");
    }

    #[test]
    fn test_pronouns_removed() {
        let r = rewriter();
        assert_eq!(r.rewrite_plain("它的用水呢").text, "用水量");
        assert_eq!(r.rewrite_plain("what is their water usage").text, "water usage");
    }

    #[test]
    fn test_idempotent() {
        let r = rewriter();
        for q in [
            "2023年台積電的碳排放量是多少",
            "TSMC GHG scope 1 emissions 2021-2023",
            "請問聯發科的員工數與獨董比例",
            "中信金 負面新聞",
            "ＡＳＥ　２０２２　ＣＯ２ｅ",
            "碳排碳排放量",
            "ESG是什麼",
        ] {
            let meta = RuleBasedExtractor::new(r.vocab.clone()).parse(q);
            let once = r.rewrite(q, &meta);
            let twice = r.rewrite(&once.text, &meta);
            assert_eq!(once, twice, "rewrite not idempotent for {:?}", q);
        }
    }

    #[test]
    fn test_empty_core_uses_fallback() {
        let r = rewriter();
        let out = r.rewrite_plain("台積電 2023");
        assert_eq!(out.text, FALLBACK_CORE);
        assert!(out.fallback);

        let meta = ExtractedMetadata {
            category: Some(Category::Governance),
            ..Default::default()
        };
        assert_eq!(r.rewrite("2330", &meta).text, "治理");
    }

    #[test]
    fn test_ellipsis_resolved_from_history() {
        let r = rewriter();
        let history = vec![
            Turn::new("台積電 2023 用電量", "…"),
            Turn::new("鴻海呢", "…"),
        ];
        let meta = RuleBasedExtractor::new(r.vocab.clone()).parse("那2022呢");
        let out = r.rewrite_in_context("那2022呢", &meta, &history);
        assert_eq!(out.text, "用電量");
        assert!(!out.fallback);
    }

    #[test]
    fn test_unknown_numbers_kept() {
        let r = rewriter();
        assert_eq!(r.rewrite_plain("台積電 100 噸").text, "100 噸");
    }
}
