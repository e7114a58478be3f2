//! Reciprocal Rank Fusion: score = Σ 1/(k + rank_i)
//!
//! Combines the lexical and vector rankings into one ordering without
//! normalizing scores across backends (BM25 and cosine are not comparable;
//! ranks are). Pure function over its inputs: identical inputs produce
//! byte-identical output ordering and scores.

pub mod types;

pub use types::Candidate;

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::index::RankedDoc;

/// Fuses two ranked lists with RRF.
///
/// `k` is the smoothing constant (default 60); larger values flatten the
/// influence of top ranks. Ties are broken by the smaller minimum input rank,
/// then by `chunk_id`, so the ordering is fully deterministic. Empty inputs
/// yield an empty output, never an error.
pub fn fuse(lexical: &[RankedDoc], vector: &[RankedDoc], k: u32, top_n: usize) -> Vec<Candidate> {
    let mut by_id: HashMap<&str, Candidate> = HashMap::with_capacity(lexical.len() + vector.len());

    for (i, doc) in lexical.iter().enumerate() {
        let rank = (i + 1) as u32;
        let entry = by_id
            .entry(doc.chunk_id.as_str())
            .or_insert_with(|| empty_candidate(doc));
        entry.lexical_rank = Some(rank);
        entry.fused_score += rrf_term(k, rank);
    }

    for (i, doc) in vector.iter().enumerate() {
        let rank = (i + 1) as u32;
        let entry = by_id
            .entry(doc.chunk_id.as_str())
            .or_insert_with(|| empty_candidate(doc));
        entry.vector_rank = Some(rank);
        entry.fused_score += rrf_term(k, rank);
        // Either list may carry the stored text; keep whichever arrived first.
        if entry.text.is_none() {
            entry.text = doc.text.clone();
        }
        if entry.source.is_none() {
            entry.source = doc.source.clone();
        }
    }

    let mut candidates: Vec<Candidate> = by_id.into_values().collect();

    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.min_rank().cmp(&b.min_rank()))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    candidates.truncate(top_n);
    candidates
}

#[inline]
fn rrf_term(k: u32, rank: u32) -> f64 {
    1.0 / (k as f64 + rank as f64)
}

fn empty_candidate(doc: &RankedDoc) -> Candidate {
    Candidate {
        chunk_id: doc.chunk_id.clone(),
        lexical_rank: None,
        vector_rank: None,
        fused_score: 0.0,
        rerank_score: None,
        text: doc.text.clone(),
        source: doc.source.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RankedDoc;

    fn docs(ids: &[&str]) -> Vec<RankedDoc> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| RankedDoc::new(*id, 10.0 - i as f32))
            .collect()
    }

    #[test]
    fn test_worked_example_k60() {
        // lexical [A, B, C], vector [B, A, D]; see the module-level formula.
        let lexical = docs(&["A", "B", "C"]);
        let vector = docs(&["B", "A", "D"]);

        let fused = fuse(&lexical, &vector, 60, 10);

        let ids: Vec<&str> = fused.iter().map(|c| c.chunk_id.as_str()).collect();
        // A and B tie exactly (1/61 + 1/62 both ways) with equal min-rank 1,
        // so chunk_id decides; same for the C/D tail at 1/63.
        assert_eq!(ids, vec!["A", "B", "C", "D"]);

        let expected_top = 1.0 / 61.0 + 1.0 / 62.0;
        assert_eq!(fused[0].fused_score, expected_top);
        assert_eq!(fused[1].fused_score, expected_top);
        assert_eq!(fused[2].fused_score, 1.0 / 63.0);
        assert_eq!(fused[3].fused_score, 1.0 / 63.0);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let lexical = docs(&["x", "q", "m", "a"]);
        let vector = docs(&["m", "x", "z"]);

        let first = fuse(&lexical, &vector, 60, 10);
        for _ in 0..5 {
            let again = fuse(&lexical, &vector, 60, 10);
            let a: Vec<_> = first.iter().map(|c| (&c.chunk_id, c.fused_score)).collect();
            let b: Vec<_> = again.iter().map(|c| (&c.chunk_id, c.fused_score)).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_both_empty_yields_empty() {
        let fused = fuse(&[], &[], 60, 10);
        assert!(fused.is_empty());
    }

    #[test]
    fn test_single_list_is_rescored_not_reused() {
        let lexical = docs(&["A", "B", "C"]);
        let fused = fuse(&lexical, &[], 60, 10);

        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].chunk_id, "A");
        // Scores follow the formula, not the raw backend scores.
        assert_eq!(fused[0].fused_score, 1.0 / 61.0);
        assert_eq!(fused[1].fused_score, 1.0 / 62.0);
        assert_eq!(fused[2].fused_score, 1.0 / 63.0);
        assert!(fused.iter().all(|c| c.vector_rank.is_none()));
    }

    #[test]
    fn test_top_n_caps_output() {
        let lexical = docs(&["a", "b", "c", "d", "e"]);
        let vector = docs(&["f", "g", "h"]);
        let fused = fuse(&lexical, &vector, 60, 3);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_ranks_recorded_for_both_lists() {
        let lexical = docs(&["A", "B"]);
        let vector = docs(&["B", "A"]);
        let fused = fuse(&lexical, &vector, 60, 10);

        let a = fused.iter().find(|c| c.chunk_id == "A").unwrap();
        assert_eq!(a.lexical_rank, Some(1));
        assert_eq!(a.vector_rank, Some(2));
        assert_eq!(a.min_rank(), 1);
    }

    #[test]
    fn test_text_from_either_list_is_kept() {
        let lexical = vec![RankedDoc::new("A", 1.0)];
        let vector = vec![RankedDoc::new("A", 0.9).with_text("chunk body")];
        let fused = fuse(&lexical, &vector, 60, 10);
        assert_eq!(fused[0].text.as_deref(), Some("chunk body"));
    }

    #[test]
    fn test_larger_k_flattens_top_rank_influence() {
        let lexical = docs(&["A", "B"]);
        let small_k = fuse(&lexical, &[], 1, 10);
        let large_k = fuse(&lexical, &[], 1000, 10);

        let gap_small = small_k[0].fused_score - small_k[1].fused_score;
        let gap_large = large_k[0].fused_score - large_k[1].fused_score;
        assert!(gap_small > gap_large);
    }
}
