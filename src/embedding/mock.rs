//! Deterministic mock embedder for tests and stub mode.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::error::EmbeddingError;
use super::EmbeddingClient;
use crate::hashing::hash_to_u64;

/// Produces a deterministic pseudo-embedding from a hash of the input text.
///
/// Identical texts always embed identically, which is what the embedding-tier
/// coalescing tests rely on.
pub struct MockEmbeddingClient {
    model_version: String,
    dim: usize,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockEmbeddingClient {
    /// Creates a mock with a small dimension (16) to keep tests cheap.
    pub fn new() -> Self {
        Self::with_version("mock-emb-v1")
    }

    /// Creates a mock reporting a specific model version.
    pub fn with_version(model_version: impl Into<String>) -> Self {
        Self {
            model_version: model_version.into(),
            dim: 16,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent embed call fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Number of embed calls observed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockEmbeddingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingClient for MockEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::RequestFailed {
                message: "mock failure injected".to_string(),
            });
        }

        // Cheap xorshift seeded by the text hash; values land in [-1, 1).
        let mut state = hash_to_u64(text.as_bytes()) | 1;
        let vector = (0..self.dim)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state as f32 / u64::MAX as f32) * 2.0 - 1.0
            })
            .collect();

        Ok(vector)
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    async fn is_ready(&self) -> bool {
        !self.fail.load(Ordering::SeqCst)
    }
}
