use serde::{Deserialize, Serialize};

use crate::index::SourceSpan;

/// One fused candidate. Lives for a single retrieval call; never persisted
/// except as a serialized cache value inside the fused/reranked tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable chunk identifier.
    pub chunk_id: String,
    /// 1-based rank in the lexical list, if the chunk appeared there.
    pub lexical_rank: Option<u32>,
    /// 1-based rank in the vector list, if the chunk appeared there.
    pub vector_rank: Option<u32>,
    /// Accumulated RRF score.
    pub fused_score: f64,
    /// Cross-encoder score; `None` until reranked.
    pub rerank_score: Option<f32>,
    /// Chunk text carried along for reranking and assembly.
    pub text: Option<String>,
    /// Source span for dedup and citations.
    pub source: Option<SourceSpan>,
}

impl Candidate {
    /// Smaller of the two input ranks; used as the first tie-break.
    pub fn min_rank(&self) -> u32 {
        match (self.lexical_rank, self.vector_rank) {
            (Some(l), Some(v)) => l.min(v),
            (Some(l), None) => l,
            (None, Some(v)) => v,
            (None, None) => u32::MAX,
        }
    }

    /// The score the caller should order by: rerank when present, else fused.
    pub fn final_score(&self) -> f64 {
        match self.rerank_score {
            Some(score) => score as f64,
            None => self.fused_score,
        }
    }
}
