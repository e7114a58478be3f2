//! Request and response surface of the engine.

use serde::{Deserialize, Serialize};

use crate::assemble::{AssembledContext, Citation};
use crate::cache::CachePolicy;
use crate::router::RouteDecision;

/// One retrieval request.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    /// Raw query text.
    pub query_text: String,
    /// Caller's tenant identifier; scopes index filters and cache keys.
    pub tenant_id: String,
    /// Final candidate count; defaults to the configured `final_k`.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Allow the multi-hop path when the router classifies the query complex.
    #[serde(default)]
    pub enable_multihop: bool,
    /// Per-request budget override, capped at the configured total budget.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    /// Caller-supplied trace id; generated when absent.
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Flags that bypass the fused/reranked cache tiers.
    #[serde(default)]
    pub cache_policy: CachePolicy,
}

impl QueryRequest {
    /// A plain request with every optional field defaulted.
    pub fn new(query_text: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            tenant_id: tenant_id.into(),
            top_k: None,
            enable_multihop: false,
            max_latency_ms: None,
            trace_id: None,
            cache_policy: CachePolicy::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_multihop(mut self) -> Self {
        self.enable_multihop = true;
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }
}

/// One ranked result in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCandidate {
    pub chunk_id: String,
    /// Final score: rerank score when available, fused score otherwise.
    pub score: f64,
    /// 1-based rank in the final ordering.
    pub rank: usize,
    /// Citation when the chunk made it into the assembled context.
    pub citation: Option<Citation>,
}

/// Per-stage wall-clock times, for SLO accounting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    pub total_ms: u64,
    pub retrieval_ms: u64,
    pub fusion_ms: u64,
    pub rerank_ms: u64,
    pub assembly_ms: u64,
    /// Rewrite rounds the orchestrator used; zero on the single-pass path.
    pub orchestrator_iterations: u32,
}

/// Structured response: quality flags are explicit so the caller can decide
/// whether to retry, accept, or escalate.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub trace_id: String,
    pub route: RouteDecision,
    pub candidates: Vec<ResponseCandidate>,
    /// Budgeted context for the downstream generator.
    pub context: AssembledContext,
    /// A refinement stage fell back (index loss, rerank timeout, ...).
    pub degraded: bool,
    /// Multi-hop ended at the iteration bound with a partial set.
    pub low_confidence: bool,
    /// Tiers that served at least one hit during this request.
    pub cache_hit_tiers: Vec<String>,
    pub latency_breakdown: LatencyBreakdown,
}

/// Per-dependency readiness, aggregated for the readiness probe.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReadyReport {
    pub lexical: bool,
    pub vector: bool,
    pub embedder: bool,
    pub reranker: bool,
    pub cache: bool,
}

impl ReadyReport {
    /// `true` when every dependency answered its readiness check.
    pub fn all_ready(&self) -> bool {
        self.lexical && self.vector && self.embedder && self.reranker && self.cache
    }
}
