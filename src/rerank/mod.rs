//! Cross-encoder reranking client.
//!
//! Reranking is an accuracy refinement, not a correctness requirement: every
//! failure path here degrades to the fused ordering instead of failing the
//! request, and the degradation is explicit in [`RerankResult`].

pub mod config;
pub mod error;
pub mod mock;


pub use config::RerankerConfig;
pub use error::RerankError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockCrossEncoder;

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::fusion::Candidate;

/// Minimal async interface over the external cross-encoder service.
pub trait CrossEncoderClient: Send + Sync {
    /// Scores one batch of (query, text) pairs; one score per text, same order.
    fn score_batch(
        &self,
        query: &str,
        texts: &[&str],
    ) -> impl std::future::Future<Output = Result<Vec<f32>, RerankError>> + Send;

    /// Model version identifier, folded into reranked-tier cache keys.
    fn model_version(&self) -> &str;

    /// Returns `true` if the backend is reachable.
    fn is_ready(&self) -> impl std::future::Future<Output = bool> + Send;
}

/// Why a rerank pass fell back to fused order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RerankFallback {
    /// The deadline elapsed mid-scoring.
    Timeout,
    /// The cross-encoder service errored.
    Unavailable,
    /// Retrieval left too little budget; reranking was skipped outright.
    BudgetExhausted,
    /// A tight budget shrank scoring to the top batch; the tail kept fused
    /// order.
    PartialCoverage,
}

/// Outcome of a rerank pass; the fallback variant is still a usable ranking.
#[derive(Debug, Clone)]
pub enum RerankResult {
    /// Every candidate scored and reordered by the cross-encoder.
    Reranked(Vec<Candidate>),
    /// Only the top batch was scored (tight budget); the tail kept fused
    /// order. Usable, but not full quality.
    Partial(Vec<Candidate>),
    /// Fused-order truncation, with the reason reranking was not applied.
    FusedOrder(Vec<Candidate>, RerankFallback),
}

impl RerankResult {
    /// The candidate list regardless of path.
    pub fn candidates(&self) -> &[Candidate] {
        match self {
            RerankResult::Reranked(c) => c,
            RerankResult::Partial(c) => c,
            RerankResult::FusedOrder(c, _) => c,
        }
    }

    /// Consumes the result, returning candidates and the degraded flag.
    pub fn into_parts(self) -> (Vec<Candidate>, Option<RerankFallback>) {
        match self {
            RerankResult::Reranked(c) => (c, None),
            RerankResult::Partial(c) => (c, Some(RerankFallback::PartialCoverage)),
            RerankResult::FusedOrder(c, reason) => (c, Some(reason)),
        }
    }

    /// Returns `true` for anything below a full-coverage rerank.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, RerankResult::Reranked(_))
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<&'a str>,
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

/// HTTP adapter over a cross-encoder service exposing `POST {base}/rerank`.
#[derive(Clone)]
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    base_url: String,
    model_version: String,
}

impl HttpCrossEncoder {
    /// Creates a client for `base_url`.
    pub fn new(base_url: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model_version: model_version.into(),
        }
    }
}

impl std::fmt::Debug for HttpCrossEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCrossEncoder")
            .field("base_url", &self.base_url)
            .field("model_version", &self.model_version)
            .finish()
    }
}

impl CrossEncoderClient for HttpCrossEncoder {
    async fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError> {
        let url = format!("{}/rerank", self.base_url);
        let body = RerankRequest {
            query,
            documents: texts.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RerankError::RequestFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RerankError::RequestFailed {
                message: format!("status {}", response.status()),
            });
        }

        let parsed: RerankResponse =
            response
                .json()
                .await
                .map_err(|e| RerankError::InvalidResponse {
                    message: e.to_string(),
                })?;

        if parsed.scores.len() != texts.len() {
            return Err(RerankError::BatchMismatch {
                sent: texts.len(),
                received: parsed.scores.len(),
            });
        }

        Ok(parsed.scores)
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    async fn is_ready(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Batching, deadline-aware wrapper around a [`CrossEncoderClient`].
pub struct RerankerClient<C: CrossEncoderClient> {
    transport: C,
    config: RerankerConfig,
}

impl<C: CrossEncoderClient> std::fmt::Debug for RerankerClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RerankerClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: CrossEncoderClient> RerankerClient<C> {
    /// Wraps a transport with the given config.
    pub fn new(transport: C, config: RerankerConfig) -> Self {
        Self { transport, config }
    }

    /// Returns the transport's model version.
    pub fn model_version(&self) -> &str {
        self.transport.model_version()
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &C {
        &self.transport
    }

    /// Reranks `candidates` for `query` within `timeout`.
    ///
    /// Sub-batches up to `max_batch_size` texts per call. A timeout below the
    /// skip floor skips scoring outright; one below half the allotted budget
    /// scores only the top batch and reports [`RerankResult::Partial`]. Any
    /// transport failure or deadline overrun falls back to fused order — the
    /// caller always gets a ranking.
    #[instrument(skip(self, query, candidates), fields(candidates = candidates.len(), final_k = final_k, timeout_ms = timeout.as_millis() as u64))]
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        final_k: usize,
        timeout: Duration,
    ) -> RerankResult {
        if candidates.is_empty() {
            return RerankResult::Reranked(candidates);
        }

        if timeout < self.config.skip_floor {
            debug!("Remaining budget below skip floor, returning fused order");
            return RerankResult::FusedOrder(
                truncate_fused(candidates, final_k),
                RerankFallback::BudgetExhausted,
            );
        }

        // Retrieval overran its share: score only the top batch instead of
        // breaching the total budget.
        let tight = timeout < self.config.allotted_budget / 2;
        let score_limit = if tight {
            debug!("Remaining budget tight, scoring top batch only");
            self.config.max_batch_size
        } else {
            candidates.len()
        };
        let partial = tight && candidates.len() > score_limit;

        let deadline = Instant::now() + timeout;
        match self.score_all(query, candidates.clone(), score_limit, deadline).await {
            Ok(mut scored) => {
                scored.sort_by(compare_reranked);
                log_score_stats(&scored);
                scored.truncate(final_k);
                if partial {
                    RerankResult::Partial(scored)
                } else {
                    RerankResult::Reranked(scored)
                }
            }
            Err(e) => {
                let reason = match e {
                    RerankError::Timeout => RerankFallback::Timeout,
                    _ => RerankFallback::Unavailable,
                };
                warn!(error = %e, "Rerank failed, falling back to fused order");
                RerankResult::FusedOrder(truncate_fused(candidates, final_k), reason)
            }
        }
    }

    async fn score_all(
        &self,
        query: &str,
        mut candidates: Vec<Candidate>,
        score_limit: usize,
        deadline: Instant,
    ) -> Result<Vec<Candidate>, RerankError> {
        // Indices of candidates that carry text and fall inside the limit;
        // the rest keep fused order behind the scored ones.
        let scorable: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.text.is_some())
            .map(|(i, _)| i)
            .take(score_limit)
            .collect();

        for batch in scorable.chunks(self.config.max_batch_size) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RerankError::Timeout);
            }

            let texts: Vec<&str> = batch
                .iter()
                .map(|&i| candidates[i].text.as_deref().unwrap_or_default())
                .collect();

            let scores = tokio::time::timeout(remaining, self.transport.score_batch(query, &texts))
                .await
                .map_err(|_| RerankError::Timeout)??;

            if scores.len() != batch.len() {
                return Err(RerankError::BatchMismatch {
                    sent: batch.len(),
                    received: scores.len(),
                });
            }

            for (&i, score) in batch.iter().zip(scores) {
                candidates[i].rerank_score = Some(score);
            }
        }

        Ok(candidates)
    }
}

/// Emits the score distribution of a completed pass.
fn log_score_stats(candidates: &[Candidate]) {
    let scores: Vec<f32> = candidates.iter().filter_map(|c| c.rerank_score).collect();
    if scores.is_empty() {
        return;
    }
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mean = scores.iter().sum::<f32>() / scores.len() as f32;
    debug!(
        scored = scores.len(),
        score_min = min,
        score_max = max,
        score_mean = mean,
        "rerank pass scored"
    );
}

/// Orders scored candidates first (descending), then unscored by fused order.
fn compare_reranked(a: &Candidate, b: &Candidate) -> Ordering {
    match (a.rerank_score, b.rerank_score) {
        (Some(sa), Some(sb)) => sb
            .partial_cmp(&sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b
            .fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id)),
    }
}

fn truncate_fused(mut candidates: Vec<Candidate>, final_k: usize) -> Vec<Candidate> {
    candidates.truncate(final_k);
    candidates
}
