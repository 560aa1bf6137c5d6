use super::support::{
    evidence, fixture_store, pipeline, vocab, RecordingStore, ScriptedLlm, EMBEDDING_DIMENSIONS,
};
use crate::embeddings::TrigramProvider;
use crate::expand::TemplateExpander;
use crate::generate::parse_answer;
use crate::metadata::RuleBasedExtractor;
use crate::retrieval::{HitPool, MetadataFilter, Retriever, RetrieverSettings};
use crate::rewrite::QueryRewriter;
use crate::store::SearchHit;
use crate::types::{Answer, Query};
use esg_core::{Collection, RetrievalMode};
use esg_prompt::assemble;
use std::sync::Arc;

fn hit(id: &str, score: f32) -> SearchHit {
    SearchHit {
        chunk_id: id.to_string(),
        score,
        collection: Collection::EsgReport,
    }
}

#[tokio::test]
async fn test_unrelaxed_evidence_always_satisfies_the_filter() {
    let store = fixture_store().await;
    let retriever = Retriever::new(
        store,
        Arc::new(TrigramProvider::new(EMBEDDING_DIMENSIONS)),
        RetrieverSettings::default(),
    );
    let rules = RuleBasedExtractor::new(vocab());
    let rewriter = QueryRewriter::new(vocab());
    let expander = TemplateExpander::new(5);

    for (question, mode) in [
        ("2023年台積電的碳排放量是多少", RetrievalMode::Data),
        ("台積電 2022 2023 溫室氣體", RetrievalMode::All),
        ("鴻海 2023 負面新聞", RetrievalMode::News),
        ("台積電 2023 用水量", RetrievalMode::All),
    ] {
        let meta = rules.parse(question);
        let rewritten = rewriter.rewrite(question, &meta);
        let variants = expander.variants(&rewritten, &meta);
        let ranked = retriever
            .retrieve(&variants, mode, &meta, question)
            .await
            .unwrap();

        assert!(!ranked.is_empty(), "no evidence for {:?}", question);
        assert!(ranked.relaxed.is_none(), "relaxed for {:?}", question);

        let filter = MetadataFilter::from_metadata(&meta);
        for item in &ranked.items {
            assert!(
                mode.collections().contains(&item.chunk.collection),
                "{:?} returned a chunk outside its mode",
                question
            );
            assert!(
                filter.matches(item.chunk.collection, &item.chunk.metadata),
                "{:?} returned {} which violates its filter",
                question,
                item.chunk.id
            );
        }
    }
}

#[test]
fn test_merge_keeps_max_score_regardless_of_order() {
    let first = vec![hit("a", 0.40), hit("b", 0.90), hit("c", 0.10)];
    let second = vec![hit("a", 0.75), hit("b", 0.20), hit("d", 0.55)];

    let mut forward = HitPool::new();
    forward.add(0, first.clone());
    forward.add(1, second.clone());

    let mut backward = HitPool::new();
    backward.add(1, second);
    backward.add(0, first);

    assert_eq!(forward, backward);
    assert_eq!(forward.len(), 4);
    assert_eq!(forward.score("a"), Some(0.75));
    assert_eq!(forward.score("b"), Some(0.90));
    assert_eq!(forward.provenance("a").unwrap().len(), 2);
    assert_eq!(forward.provenance("d").unwrap().len(), 1);
}

#[test]
fn test_every_citation_resolves_to_prompt_evidence() {
    let ranked = evidence(vec![
        ("r1", Collection::EsgReport, 0.9),
        ("r2", Collection::EsgReport, 0.7),
        ("n1", Collection::News, 0.5),
    ]);
    let prompt = assemble("台積電 2023 碳排放", RetrievalMode::All, &ranked).unwrap();

    for raw in [
        "排放量 [1]，新聞 [3]",
        "錯誤引用 [0] [4] [99]",
        "合併引用 [1, 2, 7]",
        "全形 [2，3、3]",
        "沒有引用",
        "資料不足",
    ] {
        let answer = parse_answer(raw, &prompt);
        let Answer::Final {
            citations,
            unverified,
            ..
        } = &answer
        else {
            panic!("parse_answer must produce a final answer");
        };

        for citation in citations {
            let cited = prompt
                .citation(citation.index)
                .unwrap_or_else(|| panic!("{:?} cited [{}]", raw, citation.index));
            assert_eq!(cited.chunk_id, citation.chunk_id);
            assert!(ranked.contains(&citation.chunk_id));
        }

        let mut indices: Vec<usize> = citations.iter().map(|c| c.index).collect();
        indices.dedup();
        assert_eq!(indices.len(), citations.len(), "duplicate citations for {:?}", raw);

        if citations.is_empty() && !raw.contains("資料不足") {
            assert!(unverified, "{:?} should be unverified", raw);
        }
    }
}

#[tokio::test]
async fn test_explicit_mode_bounds_the_searched_collections() {
    let base = fixture_store().await;

    for mode in [RetrievalMode::All, RetrievalMode::Data, RetrievalMode::News] {
        for question in [
            "2023年台積電的碳排放量是多少",
            "鴻海 2023 負面新聞",
            "台積電 2023",
        ] {
            let store = Arc::new(RecordingStore::new(base.clone()));
            let llm = Arc::new(ScriptedLlm::new(vec![Ok("資料不足".to_string())]));
            let pipeline = pipeline(store.clone(), llm);

            let answer = pipeline
                .answer_query(&Query::new(question).with_mode(mode))
                .await;

            match &answer {
                Answer::Final { mode: used, .. }
                | Answer::InsufficientEvidence { mode: used, .. } => assert_eq!(*used, mode),
                other => panic!("unexpected answer for {:?}: {:?}", question, other),
            }
            for (collection, _) in store.searches() {
                assert!(
                    mode.collections().contains(&collection),
                    "{:?} in {} mode searched {:?}",
                    question,
                    mode,
                    collection
                );
            }
        }
    }
}

#[tokio::test]
async fn test_ambiguous_questions_never_reach_the_store() {
    let store = Arc::new(RecordingStore::new(fixture_store().await));
    let llm = Arc::new(ScriptedLlm::new(vec![]));
    let pipeline = pipeline(store.clone(), llm.clone());

    for question in ["ESG是什麼", "你好", "   ", "可以查什麼", "hi"] {
        let answer = pipeline.answer_query(&Query::new(question)).await;
        assert_eq!(answer.kind_name(), "guided", "{:?}", question);
    }
    assert_eq!(store.search_count(), 0);
    assert_eq!(llm.calls(), 0);
}
