use std::time::Duration;

use super::{EngineError, PipelineConfig, QueryRequest, RetrievalEngine};
use crate::cache::{CachePolicy, MockCacheBackend, SemanticCache};
use crate::constants::MAX_QUERY_BYTES;
use crate::embedding::MockEmbeddingClient;
use crate::hashing;
use crate::index::{MockLexicalIndex, MockVectorIndex, RankedDoc};
use crate::rerank::{MockCrossEncoder, RerankerClient, RerankerConfig};
use crate::router::RouteDecision;

type TestEngine = RetrievalEngine<
    MockLexicalIndex,
    MockVectorIndex,
    MockEmbeddingClient,
    MockCrossEncoder,
    MockCacheBackend,
>;

const TENANT: &str = "acme";

fn docs(n: usize) -> Vec<RankedDoc> {
    (0..n)
        .map(|i| RankedDoc::new(format!("c{i}"), 10.0 - i as f32).with_text(format!("chunk body {i}")))
        .collect()
}

fn engine_with_docs(n: usize) -> TestEngine {
    engine_with_docs_and_config(n, PipelineConfig::default())
}

fn engine_with_docs_and_config(n: usize, config: PipelineConfig) -> TestEngine {
    let engine = RetrievalEngine::new(
        MockLexicalIndex::new(),
        MockVectorIndex::new(),
        MockEmbeddingClient::new(),
        RerankerClient::new(MockCrossEncoder::new(), RerankerConfig::default()),
        SemanticCache::new(MockCacheBackend::new()),
        config,
    );
    let tenant_hash = hashing::hash_tenant_id(TENANT);
    engine.lexical.seed(tenant_hash, docs(n));
    engine.vector.seed(tenant_hash, docs(n));
    // Pin all seeded texts above the sufficiency bar so grading is stable.
    for i in 0..n {
        engine
            .reranker
            .transport()
            .pin_score(format!("chunk body {i}"), 0.9 - i as f32 * 0.01);
    }
    engine
}

fn request(query: &str) -> QueryRequest {
    QueryRequest::new(query, TENANT)
}

#[tokio::test]
async fn test_empty_query_is_a_validation_error() {
    let engine = engine_with_docs(3);
    let err = engine.query(request("   ")).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}

#[tokio::test]
async fn test_oversize_query_is_a_validation_error() {
    let engine = engine_with_docs(3);
    let err = engine
        .query(request(&"x".repeat(MAX_QUERY_BYTES + 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}

#[tokio::test]
async fn test_empty_tenant_is_a_validation_error() {
    let engine = engine_with_docs(3);
    let err = engine
        .query(QueryRequest::new("what is braid", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}

#[tokio::test]
async fn test_single_pass_happy_path() {
    let engine = engine_with_docs(5);
    let response = engine.query(request("what is the refund policy")).await.unwrap();

    assert_eq!(response.route, RouteDecision::Simple);
    assert!(!response.degraded);
    assert!(!response.low_confidence);
    assert_eq!(response.candidates.len(), 5);
    assert!(response.cache_hit_tiers.is_empty());

    // Ranks are sequential and every candidate carries a rerank score.
    for (i, candidate) in response.candidates.iter().enumerate() {
        assert_eq!(candidate.rank, i + 1);
        assert!(candidate.citation.is_some());
    }
    // Pinned scores descend with the seed index, so c0 stays on top.
    assert_eq!(response.candidates[0].chunk_id, "c0");
    assert_eq!(response.context.chunks.len(), 5);
    assert_eq!(response.latency_breakdown.orchestrator_iterations, 0);
}

#[tokio::test]
async fn test_top_k_truncates_the_response() {
    let engine = engine_with_docs(8);
    let response = engine
        .query(request("what is the refund policy").with_top_k(3))
        .await
        .unwrap();
    assert_eq!(response.candidates.len(), 3);
}

#[tokio::test]
async fn test_lost_lexical_leg_degrades_to_vector_ranking() {
    let engine = engine_with_docs(5);
    engine.lexical.set_failing(true);

    let response = engine.query(request("what is the refund policy")).await.unwrap();
    assert!(response.degraded);
    assert_eq!(response.candidates.len(), 5);
}

#[tokio::test]
async fn test_both_legs_lost_is_index_unavailable() {
    let engine = engine_with_docs(5);
    engine.lexical.set_failing(true);
    engine.vector.set_failing(true);

    let err = engine.query(request("what is the refund policy")).await.unwrap_err();
    assert!(matches!(err, EngineError::IndexUnavailable { .. }));
}

#[tokio::test]
async fn test_slow_legs_time_out_to_index_unavailable() {
    let engine = engine_with_docs(5);
    engine.lexical.set_delay(Some(Duration::from_millis(500)));
    engine.vector.set_delay(Some(Duration::from_millis(500)));

    let err = engine.query(request("what is the refund policy")).await.unwrap_err();
    assert!(matches!(err, EngineError::IndexUnavailable { .. }));
}

#[tokio::test]
async fn test_repeat_query_hits_fused_and_reranked_tiers() {
    let engine = engine_with_docs(5);

    let first = engine.query(request("what is the refund policy")).await.unwrap();
    assert!(first.cache_hit_tiers.is_empty());

    let second = engine.query(request("what is the refund policy")).await.unwrap();
    // A fused hit short-circuits the embed and retrieval stages entirely,
    // so the embedding tier is never even consulted.
    assert_eq!(second.cache_hit_tiers, vec!["fused", "reranked"]);
    assert_eq!(engine.lexical.call_count(), 1);
    assert_eq!(engine.vector.call_count(), 1);

    let a: Vec<&str> = first.candidates.iter().map(|c| c.chunk_id.as_str()).collect();
    let b: Vec<&str> = second.candidates.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_degraded_fused_result_is_not_cached() {
    let engine = engine_with_docs(5);
    engine.lexical.set_failing(true);

    let first = engine.query(request("what is the refund policy")).await.unwrap();
    assert!(first.degraded);

    engine.lexical.set_failing(false);
    let second = engine.query(request("what is the refund policy")).await.unwrap();
    assert!(!second.degraded);
    // The degraded pass left no fused entry, so retrieval ran again.
    assert_eq!(engine.lexical.call_count(), 2);
    assert!(!second.cache_hit_tiers.contains(&"fused".to_string()));
}

#[tokio::test]
async fn test_pii_policy_bypasses_result_tiers_but_not_embedding() {
    let engine = engine_with_docs(5);
    let policy = CachePolicy {
        pii_sensitive: true,
        ..CachePolicy::default()
    };

    let first = engine
        .query(request("show my account history").with_cache_policy(policy))
        .await
        .unwrap();
    assert!(first.cache_hit_tiers.is_empty());

    let second = engine
        .query(request("show my account history").with_cache_policy(policy))
        .await
        .unwrap();
    // Embedding keys carry no tenant data and stay usable; the result tiers
    // were never written.
    assert_eq!(second.cache_hit_tiers, vec!["embedding"]);
    assert_eq!(engine.lexical.call_count(), 2);
}

#[tokio::test]
async fn test_rerank_failure_returns_fused_order_flagged_degraded() {
    let engine = engine_with_docs(5);
    engine.reranker.transport().set_failing(true);

    let response = engine.query(request("what is the refund policy")).await.unwrap();
    assert!(response.degraded);
    // Fused order of identical seeded lists is the seeded order.
    let ids: Vec<&str> = response.candidates.iter().map(|c| c.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4"]);
}

#[tokio::test]
async fn test_degraded_rerank_is_not_cached() {
    let engine = engine_with_docs(5);
    engine.reranker.transport().set_failing(true);
    let first = engine.query(request("what is the refund policy")).await.unwrap();
    assert!(first.degraded);

    engine.reranker.transport().set_failing(false);
    let second = engine.query(request("what is the refund policy")).await.unwrap();
    // Fused tier hit is fine, but the degraded rerank must not have stuck.
    assert!(!second.degraded);
    assert!(!first.cache_hit_tiers.contains(&"reranked".to_string()));
}

#[tokio::test]
async fn test_budget_shrunk_rerank_is_flagged_and_not_cached() {
    // A rerank window of 30ms against the reranker's 80ms allotment forces
    // top-batch-only scoring: 16 of the 20 fused candidates.
    let config = PipelineConfig {
        rerank_budget: Duration::from_millis(30),
        ..PipelineConfig::default()
    };
    let engine = engine_with_docs_and_config(20, config);

    let first = engine.query(request("what is the refund policy")).await.unwrap();
    assert!(first.degraded);

    let second = engine.query(request("what is the refund policy")).await.unwrap();
    // The shrunk ordering was never stored: the fused tier hits, the reranked
    // tier does not, and the cross-encoder runs again.
    assert!(second.cache_hit_tiers.contains(&"fused".to_string()));
    assert!(!second.cache_hit_tiers.contains(&"reranked".to_string()));
    assert_eq!(engine.reranker.transport().call_count(), 2);
    assert!(second.degraded);
}

#[tokio::test]
async fn test_no_documents_yields_empty_response_not_error() {
    let engine = engine_with_docs(0);
    let response = engine.query(request("anything at all")).await.unwrap();
    assert!(response.candidates.is_empty());
    assert!(response.context.chunks.is_empty());
    assert!(!response.degraded);
}

#[tokio::test]
async fn test_complex_query_with_multihop_enabled_takes_the_hop_path() {
    let engine = engine_with_docs(5);
    let response = engine
        .query(
            request("compare the alpha plan with the beta plan, and explain why the pricing changed")
                .with_multihop(),
        )
        .await
        .unwrap();

    assert_eq!(response.route, RouteDecision::Complex);
    assert!(!response.low_confidence);
    assert_eq!(response.latency_breakdown.orchestrator_iterations, 0);
    // Both subqueries retrieve the same tenant corpus; the merged pool
    // dedupes back down to the seeded five.
    assert_eq!(response.candidates.len(), 5);
}

#[tokio::test]
async fn test_complex_query_without_opt_in_stays_single_pass() {
    let engine = engine_with_docs(5);
    let response = engine
        .query(request(
            "compare the alpha plan with the beta plan, and explain why the pricing changed",
        ))
        .await
        .unwrap();

    assert_eq!(response.route, RouteDecision::Complex);
    // Multi-hop is opt-in; without the flag the single pass ran: one lexical
    // search, no iterations.
    assert_eq!(engine.lexical.call_count(), 1);
    assert_eq!(response.latency_breakdown.orchestrator_iterations, 0);
}

#[tokio::test]
async fn test_multihop_exhaustion_returns_low_confidence_partial() {
    let engine = engine_with_docs(2);
    // Two seeded docs sit below the minimum candidate floor, so every
    // subquery grades insufficient and the loop runs out of rewrites.
    let response = engine
        .query(
            request("compare the alpha plan with the beta plan, and explain why the pricing changed")
                .with_multihop(),
        )
        .await
        .unwrap();

    assert!(response.low_confidence);
    assert_eq!(
        response.latency_breakdown.orchestrator_iterations,
        engine.config().orchestrator.max_iterations
    );
    // Best partial set still comes back.
    assert_eq!(response.candidates.len(), 2);
}

#[tokio::test]
async fn test_trace_id_is_preserved_when_supplied() {
    let engine = engine_with_docs(3);
    let mut req = request("what is the refund policy");
    req.trace_id = Some("trace-123".to_string());
    let response = engine.query(req).await.unwrap();
    assert_eq!(response.trace_id, "trace-123");
}
