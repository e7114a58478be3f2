//! Multi-hop query orchestrator.
//!
//! Complex queries are decomposed into subqueries and driven through an
//! explicit state machine: `Decompose → Retrieve → Grade → {Synthesize |
//! Rewrite} → Done`, with a terminal `Failed` state once the iteration bound
//! is hit. The loop is mechanically bounded: a monotonic rewrite counter is
//! checked before every re-entry into `Retrieve`, and `Failed` still returns
//! the best partial candidate set, flagged low-confidence.

mod plan;


use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

pub use plan::{HopState, RetrievalPlan, Subquery, SubqueryStatus};

use crate::constants::{
    DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_SUBQUERIES, DEFAULT_SUBQUERY_CONCURRENCY,
    DEFAULT_SUFFICIENCY_MIN_CANDIDATES, DEFAULT_SUFFICIENCY_THRESHOLD,
};
use crate::fusion::Candidate;

/// Result of one single-pass retrieval for one subquery.
#[derive(Debug, Clone)]
pub struct RetrievalPass {
    /// Reranked (or fused-order, when degraded) candidates.
    pub candidates: Vec<Candidate>,
    /// A refinement stage fell back during this pass.
    pub degraded: bool,
}

/// Seam to the single-pass pipeline. The orchestrator drives one retrieval
/// per ready subquery through this trait.
pub trait SubqueryRetriever: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs one retrieval pass for a subquery text.
    fn retrieve(
        &self,
        query_text: &str,
        budget: Duration,
    ) -> impl std::future::Future<Output = Result<RetrievalPass, Self::Error>> + Send;
}

/// Bounds and grading thresholds for the multi-hop loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum rewrite rounds before `Failed`.
    pub max_iterations: u32,
    /// Decomposition cap; excess clauses fold into the last subquery.
    pub max_subqueries: usize,
    /// Concurrent subquery retrievals per request, protecting the shared
    /// reranker.
    pub subquery_concurrency: usize,
    /// Minimum top rerank score for a subquery to grade sufficient.
    pub sufficiency_threshold: f32,
    /// Minimum candidate count for a subquery to grade sufficient.
    pub sufficiency_min_candidates: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_subqueries: DEFAULT_MAX_SUBQUERIES,
            subquery_concurrency: DEFAULT_SUBQUERY_CONCURRENCY,
            sufficiency_threshold: DEFAULT_SUFFICIENCY_THRESHOLD,
            sufficiency_min_candidates: DEFAULT_SUFFICIENCY_MIN_CANDIDATES,
        }
    }
}

/// What the multi-hop loop produced.
#[derive(Debug, Clone)]
pub struct MultiHopOutcome {
    /// Merged candidate pool across subqueries, ready for assembly.
    pub candidates: Vec<Candidate>,
    /// `true` when the loop ended in `Failed` (partial synthesis).
    pub low_confidence: bool,
    /// `true` when any retrieval pass fell back on a refinement stage.
    pub degraded: bool,
    /// Rewrite rounds completed.
    pub iterations: u32,
    /// Number of decomposed subqueries.
    pub subquery_count: usize,
    /// Terminal state, `Done` or `Failed`.
    pub final_state: HopState,
}

/// Drives the multi-hop state machine over a [`SubqueryRetriever`].
#[derive(Debug)]
pub struct Orchestrator<R: SubqueryRetriever> {
    retriever: R,
    config: OrchestratorConfig,
}

impl<R: SubqueryRetriever> Orchestrator<R> {
    pub fn new(retriever: R, config: OrchestratorConfig) -> Self {
        Self { retriever, config }
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    /// Runs the full loop for one complex query.
    ///
    /// Per-subquery retrieval failures are absorbed as insufficient passes;
    /// the loop itself never errors — the worst case is `Failed` with a
    /// partial candidate set.
    #[instrument(skip(self), fields(query_len = query_text.len()))]
    pub async fn run(&self, query_text: &str, budget: Duration) -> MultiHopOutcome {
        let subqueries = decompose(query_text, self.config.max_subqueries);
        let mut plan = RetrievalPlan::new(subqueries);
        debug!(subqueries = plan.subqueries.len(), "query decomposed");

        let mut degraded = false;
        plan.state = HopState::Retrieve;

        loop {
            let ready = plan.ready_indices();
            degraded |= self.retrieve_ready(&mut plan, &ready, budget).await;

            plan.state = HopState::Grade;
            for &idx in &ready {
                let sq = &mut plan.subqueries[idx];
                sq.status = if grade(&sq.candidates, &self.config) {
                    SubqueryStatus::Sufficient
                } else {
                    SubqueryStatus::Insufficient
                };
                debug!(
                    subquery = idx,
                    status = ?sq.status,
                    candidates = sq.candidates.len(),
                    "subquery graded"
                );
            }

            if plan.all_sufficient() {
                plan.state = HopState::Synthesize;
                break;
            }

            let any_insufficient = plan
                .subqueries
                .iter()
                .any(|sq| sq.status == SubqueryStatus::Insufficient);

            // The bound check guards every rewrite path back into Retrieve.
            // Dependency waves (everything graded so far is sufficient, later
            // subqueries just became ready) re-enter without consuming budget;
            // they are bounded by the subquery count.
            if any_insufficient && plan.iteration >= self.config.max_iterations {
                plan.state = HopState::Failed;
                warn!(
                    iterations = plan.iteration,
                    "iteration bound reached, returning partial synthesis"
                );
                break;
            }
            if !any_insufficient && ready.is_empty() {
                // No retrievable work and nothing to rewrite: a dependency
                // cycle would be the only way here, and decomposition only
                // emits backward edges. Bail rather than spin.
                plan.state = HopState::Failed;
                break;
            }

            if any_insufficient {
                plan.state = HopState::Rewrite;
                for sq in &mut plan.subqueries {
                    if sq.status == SubqueryStatus::Insufficient {
                        sq.text = rewrite(sq, query_text);
                        sq.rewrites += 1;
                        sq.status = SubqueryStatus::Pending;
                    }
                }
                plan.iteration += 1;
            }
            plan.state = HopState::Retrieve;
        }

        let low_confidence = plan.state == HopState::Failed;
        let final_state = if low_confidence {
            HopState::Failed
        } else {
            HopState::Done
        };
        info!(
            state = %final_state,
            iterations = plan.iteration,
            subqueries = plan.subqueries.len(),
            "multi-hop loop finished"
        );

        MultiHopOutcome {
            candidates: plan.merged_candidates(),
            low_confidence,
            degraded,
            iterations: plan.iteration,
            subquery_count: plan.subqueries.len(),
            final_state,
        }
    }

    /// Retrieves all ready subqueries, bounded by the per-request concurrency
    /// cap. Returns whether any pass was degraded.
    async fn retrieve_ready(
        &self,
        plan: &mut RetrievalPlan,
        ready: &[usize],
        budget: Duration,
    ) -> bool {
        // The subquery index is passed by value: a closure that takes `&usize`
        // and returns an async block trips rustc's "implementation of `FnOnce`
        // is not general enough" limitation once this future is nested under
        // the gateway handler.
        let passes: Vec<(usize, Result<RetrievalPass, R::Error>)> = stream::iter(
            ready.iter().copied().map(|idx| {
                let text = plan.subqueries[idx].text.clone();
                async move { (idx, self.retriever.retrieve(&text, budget).await) }
            }),
        )
        .buffer_unordered(self.config.subquery_concurrency.max(1))
        .collect()
        .await;

        let mut degraded = false;
        for (idx, result) in passes {
            match result {
                Ok(pass) => {
                    degraded |= pass.degraded;
                    // Keep the better of old and new sets so a bad rewrite
                    // cannot lose candidates already collected.
                    let sq = &mut plan.subqueries[idx];
                    if pass_quality(&pass.candidates) >= pass_quality(&sq.candidates) {
                        sq.candidates = pass.candidates;
                    }
                }
                Err(e) => {
                    warn!(subquery = idx, error = %e, "subquery retrieval failed");
                    degraded = true;
                }
            }
        }
        degraded
    }
}

/// Graded sufficient when the candidate count clears the floor and the top
/// rerank score clears the threshold. A degraded pass carries no rerank
/// scores; sufficiency then rests on count alone.
fn grade(candidates: &[Candidate], config: &OrchestratorConfig) -> bool {
    if candidates.len() < config.sufficiency_min_candidates {
        return false;
    }
    let top_rerank = candidates
        .iter()
        .filter_map(|c| c.rerank_score)
        .fold(None::<f32>, |acc, s| Some(acc.map_or(s, |a| a.max(s))));
    match top_rerank {
        Some(score) => score >= config.sufficiency_threshold,
        None => true,
    }
}

/// Comparable quality of a retrieval pass, for keeping the better of two.
fn pass_quality(candidates: &[Candidate]) -> (usize, u32) {
    let top = candidates
        .iter()
        .filter_map(|c| c.rerank_score)
        .fold(0.0f32, f32::max);
    (candidates.len(), top.to_bits())
}

const BACK_REFERENCES: &[&str] = &["it", "that", "this", "they", "them", "those", "these"];

/// Deterministic decomposition: clause-level split on sentence punctuation
/// and coordinating connectives, capped at `max_subqueries`. A clause opening
/// with a back-reference pronoun depends on the clause before it.
pub fn decompose(query_text: &str, max_subqueries: usize) -> Vec<Subquery> {
    let mut clauses: Vec<String> = query_text
        .split(|c| matches!(c, '.' | ';' | '?' | '!'))
        .flat_map(split_connectives)
        .map(str::trim)
        .filter(|clause| clause.split_whitespace().count() >= 3)
        .map(str::to_string)
        .collect();

    if clauses.len() < 2 {
        return vec![Subquery::new(query_text.trim().to_string(), Vec::new())];
    }
    // Excess clauses fold into the last kept subquery rather than being
    // dropped.
    if clauses.len() > max_subqueries.max(1) {
        let tail = clauses.split_off(max_subqueries.max(1) - 1);
        clauses.push(tail.join(" "));
    }

    clauses
        .into_iter()
        .enumerate()
        .map(|(idx, text)| {
            let depends_on = if idx > 0 && references_previous(&text) {
                vec![idx - 1]
            } else {
                Vec::new()
            };
            Subquery::new(text, depends_on)
        })
        .collect()
}

fn split_connectives(segment: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = segment;
    loop {
        let cut = [" and then ", ", and ", " and ", ", then ", " then "]
            .iter()
            .filter_map(|sep| rest.find(sep).map(|at| (at, sep.len())))
            .min_by_key(|(at, _)| *at);
        match cut {
            Some((at, len)) => {
                parts.push(&rest[..at]);
                rest = &rest[at + len..];
            }
            None => {
                parts.push(rest);
                return parts;
            }
        }
    }
}

fn references_previous(clause: &str) -> bool {
    clause
        .split_whitespace()
        .take(3)
        .any(|word| BACK_REFERENCES.contains(&word.to_lowercase().trim_matches(',')))
}

/// Deterministic reformulation. Rewrites alternate: the first broadens the
/// subquery to its content words, the second narrows by pulling distinctive
/// terms from the root query back in.
fn rewrite(subquery: &Subquery, root_query: &str) -> String {
    if subquery.rewrites.is_multiple_of(2) {
        broaden(&subquery.text)
    } else {
        narrow(&subquery.original_text, root_query)
    }
}

/// Keyword-style reformulation: content words only.
fn broaden(text: &str) -> String {
    let broadened: Vec<&str> = text
        .split_whitespace()
        .filter(|word| word.len() > 3)
        .collect();
    if broadened.is_empty() {
        text.to_string()
    } else {
        broadened.join(" ")
    }
}

/// Re-anchors the subquery with root-query terms it lost in decomposition.
fn narrow(original_text: &str, root_query: &str) -> String {
    let lowered = original_text.to_lowercase();
    let extra: Vec<&str> = root_query
        .split_whitespace()
        .filter(|word| word.len() > 4 && !lowered.contains(&word.to_lowercase()))
        .take(3)
        .collect();
    if extra.is_empty() {
        original_text.to_string()
    } else {
        format!("{} {}", original_text, extra.join(" "))
    }
}
