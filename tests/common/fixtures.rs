//! Shared fixtures for integration tests: a fully mocked engine with a
//! deterministic seeded corpus.

use braid::cache::{MockCacheBackend, SemanticCache};
use braid::embedding::MockEmbeddingClient;
use braid::hashing;
use braid::index::{MockLexicalIndex, MockVectorIndex, RankedDoc};
use braid::pipeline::{PipelineConfig, RetrievalEngine};
use braid::rerank::{MockCrossEncoder, RerankerClient, RerankerConfig};

pub const TENANT: &str = "acme";

pub type MockEngine = RetrievalEngine<
    MockLexicalIndex,
    MockVectorIndex,
    MockEmbeddingClient,
    MockCrossEncoder,
    MockCacheBackend,
>;

/// Ranked corpus of `n` chunks, best first, with chunk text attached.
pub fn corpus(n: usize) -> Vec<RankedDoc> {
    (0..n)
        .map(|i| {
            RankedDoc::new(format!("c{i}"), 10.0 - i as f32).with_text(format!("chunk body {i}"))
        })
        .collect()
}

/// Engine over mocks with `n` docs seeded for [`TENANT`] in both indexes and
/// descending rerank scores pinned so the final ordering is c0, c1, ...
pub fn engine_with_docs(n: usize) -> MockEngine {
    engine_with_docs_and_config(n, PipelineConfig::default())
}

pub fn engine_with_docs_and_config(n: usize, config: PipelineConfig) -> MockEngine {
    let engine = RetrievalEngine::new(
        MockLexicalIndex::new(),
        MockVectorIndex::new(),
        MockEmbeddingClient::new(),
        RerankerClient::new(MockCrossEncoder::new(), RerankerConfig::default()),
        SemanticCache::new(MockCacheBackend::new()),
        config,
    );

    let tenant_hash = hashing::hash_tenant_id(TENANT);
    let docs = corpus(n);
    engine.lexical().seed(tenant_hash, docs.clone());
    engine.vector().seed(tenant_hash, docs);
    for i in 0..n {
        engine
            .reranker()
            .transport()
            .pin_score(format!("chunk body {i}"), 0.9 - 0.01 * i as f32);
    }
    engine
}
