//! Retrieval mode routing.

use crate::intent::Intent;
use crate::metadata::ExtractedMetadata;
use esg_core::{RetrievalMode, SourceKind};

/// Pick the retrieval mode for a run.
///
/// An explicit mode always wins. Otherwise an explicit source request
/// decides, then the mix of metric and news signals; anything else searches
/// both collections.
pub fn route(
    explicit: Option<RetrievalMode>,
    meta: &ExtractedMetadata,
    intent: Intent,
) -> RetrievalMode {
    if let Some(mode) = explicit {
        return mode;
    }
    if intent == Intent::Ambiguous {
        return RetrievalMode::All;
    }

    match meta.source {
        Some(SourceKind::Report) => return RetrievalMode::Data,
        Some(SourceKind::News) => return RetrievalMode::News,
        None => {}
    }

    let metric = meta.signals.has_metric();
    let news = meta.signals.has_news() || meta.sentiment.is_some();
    match (metric, news) {
        (true, false) => RetrievalMode::Data,
        (false, true) => RetrievalMode::News,
        _ => RetrievalMode::All,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::QuerySignals;
    use esg_core::Sentiment;

    fn meta(metric: bool, news: bool) -> ExtractedMetadata {
        ExtractedMetadata {
            signals: QuerySignals {
                metric_terms: if metric { vec!["碳排放".into()] } else { vec![] },
                news_terms: if news { vec!["新聞".into()] } else { vec![] },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_explicit_mode_always_wins() {
        for explicit in [RetrievalMode::All, RetrievalMode::Data, RetrievalMode::News] {
            for (m, n) in [(true, false), (false, true), (true, true), (false, false)] {
                for intent in [Intent::Direct, Intent::Ambiguous] {
                    assert_eq!(route(Some(explicit), &meta(m, n), intent), explicit);
                }
            }
        }
    }

    #[test]
    fn test_signal_routing() {
        assert_eq!(route(None, &meta(true, false), Intent::Direct), RetrievalMode::Data);
        assert_eq!(route(None, &meta(false, true), Intent::Direct), RetrievalMode::News);
        assert_eq!(route(None, &meta(true, true), Intent::Direct), RetrievalMode::All);
        assert_eq!(route(None, &meta(false, false), Intent::Direct), RetrievalMode::All);
    }

    #[test]
    fn test_sentiment_routes_to_news() {
        let m = ExtractedMetadata {
            sentiment: Some(Sentiment::Negative),
            ..Default::default()
        };
        assert_eq!(route(None, &m, Intent::Direct), RetrievalMode::News);
    }

    #[test]
    fn test_source_routes() {
        let mut m = meta(false, true);
        m.source = Some(SourceKind::Report);
        assert_eq!(route(None, &m, Intent::Direct), RetrievalMode::Data);
        m.source = Some(SourceKind::News);
        assert_eq!(route(None, &m, Intent::Direct), RetrievalMode::News);
    }

    #[test]
    fn test_routing_is_deterministic() {
        let m = meta(true, false);
        let first = route(None, &m, Intent::Direct);
        for _ in 0..10 {
            assert_eq!(route(None, &m, Intent::Direct), first);
        }
    }
}
