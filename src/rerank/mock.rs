//! Deterministic mock cross-encoder for tests and stub mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use super::error::RerankError;
use super::CrossEncoderClient;
use crate::hashing::hash_to_u64;

/// Scores each text deterministically from a hash of (query, text), in [0, 1).
///
/// Individual texts can be pinned to fixed scores for grading tests.
pub struct MockCrossEncoder {
    model_version: String,
    pinned: RwLock<HashMap<String, f32>>,
    fail: AtomicBool,
    delay: RwLock<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockCrossEncoder {
    /// Creates a mock reporting model version `mock-ce-v1`.
    pub fn new() -> Self {
        Self::with_version("mock-ce-v1")
    }

    /// Creates a mock reporting a specific model version.
    pub fn with_version(model_version: impl Into<String>) -> Self {
        Self {
            model_version: model_version.into(),
            pinned: RwLock::new(HashMap::new()),
            fail: AtomicBool::new(false),
            delay: RwLock::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Pins a fixed score for a specific candidate text.
    pub fn pin_score(&self, text: impl Into<String>, score: f32) {
        self.pinned.write().insert(text.into(), score);
    }

    /// Makes every subsequent batch fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Adds artificial latency to every batch (drives timeout tests).
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }

    /// Number of batch calls observed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockCrossEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossEncoderClient for MockCrossEncoder {
    async fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(RerankError::RequestFailed {
                message: "mock failure injected".to_string(),
            });
        }

        let pinned = self.pinned.read();
        let scores = texts
            .iter()
            .map(|text| {
                if let Some(&score) = pinned.get(*text) {
                    return score;
                }
                let mixed = hash_to_u64(format!("{query}\u{1f}{text}").as_bytes());
                (mixed % 10_000) as f32 / 10_000.0
            })
            .collect();

        Ok(scores)
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    async fn is_ready(&self) -> bool {
        !self.fail.load(Ordering::SeqCst)
    }
}
