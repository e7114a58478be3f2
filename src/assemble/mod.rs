//! Context assembler: the hand-off surface to the external generator.
//!
//! Takes the final candidate set, removes duplicates and overlapping source
//! spans, orders by final score, and greedily packs chunk texts until the
//! token budget runs out. Deterministic for identical inputs and budget.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fusion::Candidate;
use crate::index::SourceSpan;

/// Attribution record for one included chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    /// Source span, when the index supplied one.
    pub source: Option<SourceSpan>,
    /// Final score (rerank score when present, fused score otherwise).
    pub score: f64,
    /// 1-based position in the assembled ordering.
    pub rank: usize,
}

/// One chunk included in the assembled context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledChunk {
    pub chunk_id: String,
    pub text: String,
    /// 1-based position, matching the citation with the same rank.
    pub rank: usize,
}

/// Ordered, budgeted context ready for the generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub chunks: Vec<AssembledChunk>,
    pub citations: Vec<Citation>,
    /// Estimated tokens actually packed.
    pub token_count: usize,
    /// Budget the packing ran under.
    pub token_budget: usize,
    /// Candidates dropped for budget, duplication, or missing text.
    pub dropped: usize,
}

/// Token estimate for budget packing: the larger of the whitespace word
/// count and a four-characters-per-token floor. Overestimates slightly for
/// prose, which errs on the safe side of the generator's context window.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let by_chars = text.chars().count().div_ceil(4);
    words.max(by_chars)
}

/// Assembles the final context from a candidate pool.
///
/// Candidates without text cannot be packed and are dropped. Duplicate
/// chunk ids keep the higher-scoring instance; overlapping source spans keep
/// the higher-ranked one.
pub fn assemble(candidates: &[Candidate], token_budget: usize) -> AssembledContext {
    let mut pool: Vec<&Candidate> = candidates.iter().filter(|c| c.text.is_some()).collect();
    let missing_text = candidates.len() - pool.len();

    pool.sort_by(|a, b| {
        b.final_score()
            .partial_cmp(&a.final_score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    let mut seen_ids: Vec<&str> = Vec::new();
    let mut seen_spans: Vec<&SourceSpan> = Vec::new();
    let mut chunks = Vec::new();
    let mut citations = Vec::new();
    let mut token_count = 0usize;
    let mut dropped = missing_text;

    for candidate in pool {
        if seen_ids.contains(&candidate.chunk_id.as_str()) {
            dropped += 1;
            continue;
        }
        if let Some(span) = &candidate.source {
            if seen_spans.iter().any(|kept| kept.overlaps(span)) {
                dropped += 1;
                continue;
            }
        }

        let text = candidate.text.as_deref().unwrap_or_default();
        let tokens = estimate_tokens(text);
        if token_count + tokens > token_budget {
            dropped += 1;
            // Keep scanning: a shorter lower-ranked chunk may still fit.
            continue;
        }

        seen_ids.push(candidate.chunk_id.as_str());
        if let Some(span) = &candidate.source {
            seen_spans.push(span);
        }
        token_count += tokens;
        let rank = chunks.len() + 1;
        chunks.push(AssembledChunk {
            chunk_id: candidate.chunk_id.clone(),
            text: text.to_string(),
            rank,
        });
        citations.push(Citation {
            chunk_id: candidate.chunk_id.clone(),
            source: candidate.source.clone(),
            score: candidate.final_score(),
            rank,
        });
    }

    debug!(
        included = chunks.len(),
        dropped,
        token_count,
        token_budget,
        "context assembled"
    );

    AssembledContext {
        chunks,
        citations,
        token_count,
        token_budget,
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f32, text: &str) -> Candidate {
        Candidate {
            chunk_id: id.to_string(),
            lexical_rank: Some(1),
            vector_rank: None,
            fused_score: 0.01,
            rerank_score: Some(score),
            text: Some(text.to_string()),
            source: None,
        }
    }

    fn with_span(mut c: Candidate, uri: &str, offset: u64, length: u64) -> Candidate {
        c.source = Some(SourceSpan {
            uri: uri.to_string(),
            offset,
            length,
        });
        c
    }

    #[test]
    fn test_orders_by_final_score_and_ranks_sequentially() {
        let candidates = vec![
            candidate("low", 0.2, "low scoring chunk"),
            candidate("high", 0.9, "high scoring chunk"),
            candidate("mid", 0.5, "mid scoring chunk"),
        ];
        let ctx = assemble(&candidates, 1000);

        let ids: Vec<&str> = ctx.chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
        assert_eq!(
            ctx.citations.iter().map(|c| c.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(ctx.dropped, 0);
    }

    #[test]
    fn test_duplicate_chunk_ids_keep_higher_score() {
        let candidates = vec![
            candidate("a", 0.4, "first copy"),
            candidate("a", 0.8, "second copy"),
        ];
        let ctx = assemble(&candidates, 1000);
        assert_eq!(ctx.chunks.len(), 1);
        assert_eq!(ctx.chunks[0].text, "second copy");
        assert_eq!(ctx.dropped, 1);
    }

    #[test]
    fn test_overlapping_spans_keep_higher_ranked() {
        let candidates = vec![
            with_span(candidate("a", 0.9, "first span"), "doc://1", 0, 100),
            with_span(candidate("b", 0.5, "overlapping span"), "doc://1", 50, 100),
            with_span(candidate("c", 0.4, "disjoint span"), "doc://1", 200, 50),
        ];
        let ctx = assemble(&candidates, 1000);

        let ids: Vec<&str> = ctx.chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(ctx.dropped, 1);
    }

    #[test]
    fn test_budget_drops_lowest_ranked_first() {
        // Identical texts, so the budget fits exactly two chunks.
        let text = "alpha beta gamma delta";
        let candidates = vec![
            candidate("a", 0.9, text),
            candidate("b", 0.8, text),
            candidate("c", 0.7, text),
        ];
        let per_chunk = estimate_tokens(text);
        let ctx = assemble(&candidates, per_chunk * 2);

        let ids: Vec<&str> = ctx.chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(ctx.token_count, per_chunk * 2);
        assert_eq!(ctx.dropped, 1);
    }

    #[test]
    fn test_shorter_chunk_can_backfill_remaining_budget() {
        let ctx = assemble(
            &[
                candidate("big", 0.9, "one two three four five six seven eight"),
                candidate("huge", 0.8, "a very long chunk that cannot possibly fit in what remains of the budget at all"),
                candidate("tiny", 0.7, "small"),
            ],
            estimate_tokens("one two three four five six seven eight") + 2,
        );
        let ids: Vec<&str> = ctx.chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["big", "tiny"]);
    }

    #[test]
    fn test_candidates_without_text_are_dropped() {
        let mut no_text = candidate("bare", 0.9, "");
        no_text.text = None;
        let ctx = assemble(&[no_text, candidate("ok", 0.5, "has text")], 1000);
        assert_eq!(ctx.chunks.len(), 1);
        assert_eq!(ctx.chunks[0].chunk_id, "ok");
        assert_eq!(ctx.dropped, 1);
    }

    #[test]
    fn test_empty_input_yields_empty_context() {
        let ctx = assemble(&[], 1000);
        assert!(ctx.chunks.is_empty());
        assert!(ctx.citations.is_empty());
        assert_eq!(ctx.token_count, 0);
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let candidates: Vec<Candidate> = (0..10)
            .map(|i| candidate(&format!("c{i}"), 0.5, "tie scored chunk"))
            .collect();
        let first = assemble(&candidates, 40);
        for _ in 0..5 {
            assert_eq!(assemble(&candidates, 40), first);
        }
    }
}
