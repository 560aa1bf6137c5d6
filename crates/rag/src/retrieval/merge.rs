//! Merging per-variant search results.

use crate::store::SearchHit;
use esg_core::{Collection, EvidenceChunk, RetrievalMode, ScoredEvidence};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
struct PooledHit {
    score: f32,
    collection: Collection,
    provenance: BTreeSet<usize>,
}

/// Search hits deduplicated by chunk id.
///
/// A chunk seen by several variants keeps its maximum score and the union of
/// the variants that found it, so the order results arrive in never matters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitPool {
    hits: BTreeMap<String, PooledHit>,
}

impl HitPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record hits retrieved by query variant `variant`.
    pub fn add(&mut self, variant: usize, hits: impl IntoIterator<Item = SearchHit>) {
        for hit in hits {
            let incoming = PooledHit {
                score: hit.score,
                collection: hit.collection,
                provenance: BTreeSet::from([variant]),
            };
            self.insert(hit.chunk_id, incoming);
        }
    }

    /// Fold another pool into this one.
    pub fn absorb(&mut self, other: HitPool) {
        for (id, hit) in other.hits {
            self.insert(id, hit);
        }
    }

    fn insert(&mut self, id: String, incoming: PooledHit) {
        match self.hits.get_mut(&id) {
            Some(existing) => {
                existing.score = existing.score.max(incoming.score);
                existing.provenance.extend(incoming.provenance);
            }
            None => {
                self.hits.insert(id, incoming);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.hits.keys().map(|id| id.as_str())
    }

    pub fn score(&self, id: &str) -> Option<f32> {
        self.hits.get(id).map(|h| h.score)
    }

    pub fn provenance(&self, id: &str) -> Option<&BTreeSet<usize>> {
        self.hits.get(id).map(|h| &h.provenance)
    }

    /// Attach hydrated chunks. Ids without a chunk are dropped.
    pub fn into_scored(self, chunks: &HashMap<String, EvidenceChunk>) -> Vec<ScoredEvidence> {
        self.hits
            .into_iter()
            .filter_map(|(id, hit)| {
                let chunk = chunks.get(&id)?.clone();
                debug_assert_eq!(chunk.collection, hit.collection);
                Some(ScoredEvidence {
                    chunk,
                    score: hit.score,
                    provenance: hit.provenance,
                })
            })
            .collect()
    }
}

/// Score descending, chunk id ascending.
pub fn rank(items: &mut [ScoredEvidence]) {
    items.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

/// Keep the best `k` items.
///
/// In `all` mode `report_share` of the budget is reserved for report chunks
/// and the rest for news; slots one side cannot fill go to the best
/// remaining items of the other.
pub fn select_top_k(
    mut items: Vec<ScoredEvidence>,
    mode: RetrievalMode,
    k: usize,
    report_share: f32,
) -> Vec<ScoredEvidence> {
    rank(&mut items);
    if mode != RetrievalMode::All || items.len() <= k {
        items.truncate(k);
        return items;
    }

    let report_budget = ((k as f32) * report_share.clamp(0.0, 1.0)).round() as usize;
    let news_budget = k - report_budget.min(k);

    let mut taken = vec![false; items.len()];
    let (mut reports, mut news) = (0, 0);
    for (i, item) in items.iter().enumerate() {
        let slot = match item.chunk.collection {
            Collection::EsgReport if reports < report_budget => &mut reports,
            Collection::News if news < news_budget => &mut news,
            _ => continue,
        };
        *slot += 1;
        taken[i] = true;
    }

    let mut remaining = k - reports - news;
    for flag in taken.iter_mut() {
        if remaining == 0 {
            break;
        }
        if !*flag {
            *flag = true;
            remaining -= 1;
        }
    }

    items
        .into_iter()
        .zip(taken)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use esg_core::ChunkMetadata;

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            chunk_id: id.to_string(),
            score,
            collection: Collection::EsgReport,
        }
    }

    fn scored(id: &str, collection: Collection, score: f32) -> ScoredEvidence {
        ScoredEvidence {
            chunk: EvidenceChunk {
                id: id.to_string(),
                text: String::new(),
                collection,
                metadata: ChunkMetadata::default(),
                embedding: None,
            },
            score,
            provenance: BTreeSet::from([0]),
        }
    }

    #[test]
    fn test_merge_keeps_max_and_unions_provenance() {
        let mut pool = HitPool::new();
        pool.add(0, vec![hit("a", 0.4), hit("b", 0.9)]);
        pool.add(2, vec![hit("a", 0.7)]);

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.score("a"), Some(0.7));
        assert_eq!(pool.score("b"), Some(0.9));
        assert_eq!(pool.provenance("a"), Some(&BTreeSet::from([0, 2])));
    }

    #[test]
    fn test_absorb_is_order_independent() {
        let mut left = HitPool::new();
        left.add(0, vec![hit("a", 0.2), hit("b", 0.5)]);
        let mut right = HitPool::new();
        right.add(1, vec![hit("a", 0.6), hit("c", 0.1)]);

        let mut lr = left.clone();
        lr.absorb(right.clone());
        let mut rl = right;
        rl.absorb(left);
        assert_eq!(lr, rl);
    }

    #[test]
    fn test_rank_breaks_ties_by_id() {
        let mut items = vec![
            scored("b", Collection::News, 0.5),
            scored("a", Collection::News, 0.5),
            scored("c", Collection::News, 0.9),
        ];
        rank(&mut items);
        let ids: Vec<_> = items.iter().map(|i| i.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_all_mode_reserves_news_slots() {
        let mut items: Vec<_> = (0..6)
            .map(|i| scored(&format!("r{}", i), Collection::EsgReport, 0.9 - i as f32 * 0.01))
            .collect();
        items.push(scored("n0", Collection::News, 0.3));
        items.push(scored("n1", Collection::News, 0.2));

        let picked = select_top_k(items, RetrievalMode::All, 4, 0.5);
        let news = picked
            .iter()
            .filter(|i| i.chunk.collection == Collection::News)
            .count();
        assert_eq!(picked.len(), 4);
        assert_eq!(news, 2);
        assert_eq!(picked[0].chunk.id, "r0");
    }

    #[test]
    fn test_all_mode_fills_unused_budget() {
        let mut items: Vec<_> = (0..5)
            .map(|i| scored(&format!("r{}", i), Collection::EsgReport, 0.9 - i as f32 * 0.01))
            .collect();
        items.push(scored("n0", Collection::News, 0.1));

        let picked = select_top_k(items, RetrievalMode::All, 4, 0.5);
        let ids: Vec<_> = picked.iter().map(|i| i.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["r0", "r1", "r2", "n0"]);
    }

    #[test]
    fn test_single_mode_truncates() {
        let items = vec![
            scored("a", Collection::EsgReport, 0.1),
            scored("b", Collection::EsgReport, 0.3),
            scored("c", Collection::EsgReport, 0.2),
        ];
        let picked = select_top_k(items, RetrievalMode::Data, 2, 0.5);
        let ids: Vec<_> = picked.iter().map(|i| i.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
