//! Braid library crate (used by the server binary and integration tests).
//!
//! Hybrid retrieval and reranking engine: lexical and vector index clients,
//! Reciprocal Rank Fusion, cross-encoder reranking under a latency budget, a
//! three-tier semantic cache with single-flight coalescing, a deterministic
//! query router, a bounded multi-hop orchestrator, and a context assembler.
//!
//! # Public API Surface
//!
//! ## Engine
//! - [`RetrievalEngine`], [`PipelineConfig`] - the staged pipeline
//! - [`QueryRequest`], [`QueryResponse`], [`EngineError`] - request surface
//!
//! ## Retrieval & Ranking
//! - [`LexicalIndexClient`], [`VectorIndexClient`] - index seams
//! - [`fuse`], [`Candidate`] - Reciprocal Rank Fusion
//! - [`RerankerClient`], [`CrossEncoderClient`], [`RerankResult`] - reranking
//!
//! ## Caching
//! - [`SemanticCache`], [`CacheBackend`], [`InMemoryBackend`] - tiers & storage
//! - [`CachePolicy`], [`CacheTier`] - bypass flags and tier names
//! - Hashing functions for the normative cache-key layouts
//!
//! ## Orchestration
//! - [`classify`], [`RouteDecision`] - deterministic routing
//! - [`Orchestrator`], [`OrchestratorConfig`] - bounded multi-hop loop
//! - [`assemble`](crate::assemble::assemble), [`AssembledContext`] - hand-off
//!
//! ## Test/Mock Support
//! Mock implementations are available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod assemble;
pub mod cache;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod fusion;
pub mod gateway;
pub mod hashing;
pub mod index;
pub mod orchestrator;
pub mod pipeline;
pub mod rerank;
pub mod router;

pub use assemble::{AssembledChunk, AssembledContext, Citation, estimate_tokens};
pub use cache::{
    CacheBackend, CacheEntry, CacheError, CacheOutcome, CachePolicy, CacheStats, CacheTier,
    InMemoryBackend, SemanticCache,
};
#[cfg(any(test, feature = "mock"))]
pub use cache::MockCacheBackend;

pub use config::{Config, ConfigError};
pub use embedding::{EmbeddingClient, EmbeddingError, HttpEmbeddingClient};
#[cfg(any(test, feature = "mock"))]
pub use embedding::MockEmbeddingClient;

pub use fusion::{Candidate, fuse};
pub use gateway::{HandlerState, create_router_with_state};
pub use hashing::{
    candidate_set_hash, embedding_key, fused_key, fused_tenant_prefix, hash_tenant_id,
    hash_to_u64, normalize_text, params_hash, reranked_key,
};
pub use index::{
    HttpLexicalIndex, IndexError, LexicalIndexClient, QdrantVectorIndex, RankedDoc, SourceSpan,
    VectorIndexClient,
};
#[cfg(any(test, feature = "mock"))]
pub use index::{MockLexicalIndex, MockVectorIndex};

pub use orchestrator::{
    HopState, MultiHopOutcome, Orchestrator, OrchestratorConfig, RetrievalPass, RetrievalPlan,
    Subquery, SubqueryRetriever, SubqueryStatus,
};
pub use pipeline::{
    EngineError, LatencyBreakdown, PipelineConfig, QueryRequest, QueryResponse, ReadyReport,
    ResponseCandidate, RetrievalEngine,
};
pub use rerank::{
    CrossEncoderClient, HttpCrossEncoder, RerankError, RerankFallback, RerankResult,
    RerankerClient, RerankerConfig,
};
#[cfg(any(test, feature = "mock"))]
pub use rerank::MockCrossEncoder;

pub use router::{RouteDecision, RouteSignals, classify, classify_with_signals};
