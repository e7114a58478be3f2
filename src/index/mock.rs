//! Mock index clients for tests and stub mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use super::error::{IndexError, IndexResult};
use super::lexical::LexicalIndexClient;
use super::model::RankedDoc;
use super::vector::VectorIndexClient;

#[derive(Default)]
struct MockIndexState {
    docs_by_tenant: RwLock<HashMap<u64, Vec<RankedDoc>>>,
    fail: AtomicBool,
    delay: RwLock<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockIndexState {
    fn seed(&self, tenant_id: u64, docs: Vec<RankedDoc>) {
        self.docs_by_tenant.write().insert(tenant_id, docs);
    }

    async fn search(&self, backend: &'static str, tenant_id: u64, top_n: usize) -> IndexResult<Vec<RankedDoc>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(IndexError::SearchFailed {
                backend,
                message: "mock failure injected".to_string(),
            });
        }

        let docs = self
            .docs_by_tenant
            .read()
            .get(&tenant_id)
            .map(|docs| docs.iter().take(top_n).cloned().collect())
            .unwrap_or_default();

        Ok(docs)
    }
}

/// In-memory lexical index with injectable failures and latency.
#[derive(Default)]
pub struct MockLexicalIndex {
    state: MockIndexState,
}

impl MockLexicalIndex {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the ranked result list for a tenant (best first).
    pub fn seed(&self, tenant_id: u64, docs: Vec<RankedDoc>) {
        self.state.seed(tenant_id, docs);
    }

    /// Makes every subsequent search fail.
    pub fn set_failing(&self, failing: bool) {
        self.state.fail.store(failing, Ordering::SeqCst);
    }

    /// Adds artificial latency to every search.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.state.delay.write() = delay;
    }

    /// Number of search calls observed.
    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl LexicalIndexClient for MockLexicalIndex {
    async fn search(
        &self,
        _query_text: &str,
        tenant_id: u64,
        top_n: usize,
    ) -> IndexResult<Vec<RankedDoc>> {
        self.state.search("lexical", tenant_id, top_n).await
    }

    async fn is_ready(&self) -> bool {
        !self.state.fail.load(Ordering::SeqCst)
    }
}

/// In-memory vector index with injectable failures and latency.
///
/// The query embedding is ignored; seeded order stands in for similarity order.
#[derive(Default)]
pub struct MockVectorIndex {
    state: MockIndexState,
}

impl MockVectorIndex {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the ranked result list for a tenant (best first).
    pub fn seed(&self, tenant_id: u64, docs: Vec<RankedDoc>) {
        self.state.seed(tenant_id, docs);
    }

    /// Makes every subsequent search fail.
    pub fn set_failing(&self, failing: bool) {
        self.state.fail.store(failing, Ordering::SeqCst);
    }

    /// Adds artificial latency to every search.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.state.delay.write() = delay;
    }

    /// Number of search calls observed.
    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl VectorIndexClient for MockVectorIndex {
    async fn search(
        &self,
        _embedding: Vec<f32>,
        tenant_id: u64,
        top_n: usize,
    ) -> IndexResult<Vec<RankedDoc>> {
        self.state.search("vector", tenant_id, top_n).await
    }

    async fn is_ready(&self) -> bool {
        !self.state.fail.load(Ordering::SeqCst)
    }
}
