//! Cross-cutting, shared constants.
//!
//! Prefer deriving secondary constants from primary ones to avoid drift.
//! Per-request overrides flow through [`crate::pipeline::PipelineConfig`]; the
//! values here are the defaults every module agrees on.

use std::time::Duration;

/// Embedding vector dimension expected from the external embedding service.
pub const DEFAULT_EMBEDDING_DIM: usize = 1024;

/// RRF smoothing constant. Larger values flatten the influence of top ranks.
pub const DEFAULT_RRF_K: u32 = 60;

/// Candidates requested from each index before fusion.
pub const DEFAULT_STAGE_TOP_N: usize = 50;

/// Candidates surviving fusion and entering the reranker.
pub const DEFAULT_FUSED_TOP_N: usize = 30;

/// Final candidate count returned to the caller.
pub const DEFAULT_FINAL_K: usize = 10;

/// Largest (query, text) batch sent to the cross-encoder in one call.
pub const DEFAULT_MAX_RERANK_BATCH: usize = 16;

/// Total end-to-end pipeline budget.
pub const DEFAULT_TOTAL_BUDGET: Duration = Duration::from_millis(150);

/// Share of the budget for the parallel lexical+vector retrieval phase.
pub const DEFAULT_RETRIEVAL_BUDGET: Duration = Duration::from_millis(60);

/// Share of the budget for the cross-encoder call.
pub const DEFAULT_RERANK_BUDGET: Duration = Duration::from_millis(80);

/// In-memory fusion and assembly shares (overrun degrades, never fails).
pub const DEFAULT_FUSION_BUDGET: Duration = Duration::from_millis(5);
pub const DEFAULT_ASSEMBLY_BUDGET: Duration = Duration::from_millis(5);

/// Embedding-tier TTL. Text → vector is stable for a given model version.
pub const EMBEDDING_TIER_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Fused-tier TTL. Index contents drift, so this stays short.
pub const FUSED_TIER_TTL: Duration = Duration::from_secs(15 * 60);

/// Reranked-tier TTL. Scores are stable for a (query, candidate-set) pair.
pub const RERANKED_TIER_TTL: Duration = Duration::from_secs(6 * 3600);

/// Version of the cached candidate-list layout; bump to orphan old entries.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Multi-hop rewrite bound, checked before every `Retrieve` re-entry.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Upper bound on subqueries produced by decomposition.
pub const DEFAULT_MAX_SUBQUERIES: usize = 4;

/// Concurrent subquery retrievals per request (protects the shared reranker).
pub const DEFAULT_SUBQUERY_CONCURRENCY: usize = 2;

/// Concurrent in-flight requests allowed per tenant.
pub const DEFAULT_TENANT_ADMISSION_LIMIT: usize = 32;

/// Rerank score at or above which a subquery is graded sufficient.
pub const DEFAULT_SUFFICIENCY_THRESHOLD: f32 = 0.5;

/// Minimum candidate count for a subquery to be graded sufficient.
pub const DEFAULT_SUFFICIENCY_MIN_CANDIDATES: usize = 3;

/// Default token budget for assembled context.
pub const DEFAULT_TOKEN_BUDGET: usize = 4096;

/// Longest accepted query text, in bytes. Longer input is a validation error.
pub const MAX_QUERY_BYTES: usize = 8192;
