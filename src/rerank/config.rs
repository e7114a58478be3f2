use std::time::Duration;

use crate::constants::{DEFAULT_MAX_RERANK_BATCH, DEFAULT_RERANK_BUDGET};

/// Reranker client configuration.
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Largest (query, text) batch per cross-encoder call.
    pub max_batch_size: usize,
    /// Budget the rerank stage was allotted when the pipeline is healthy.
    /// A remaining deadline below half of this shrinks work to one batch.
    pub allotted_budget: Duration,
    /// Remaining deadline below this skips reranking outright.
    pub skip_floor: Duration,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_RERANK_BATCH,
            allotted_budget: DEFAULT_RERANK_BUDGET,
            skip_floor: Duration::from_millis(5),
        }
    }
}

impl RerankerConfig {
    /// Validates invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be non-zero".to_string());
        }
        if self.skip_floor > self.allotted_budget {
            return Err("skip_floor must not exceed allotted_budget".to_string());
        }
        Ok(())
    }
}
