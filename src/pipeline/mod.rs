//! The retrieval engine: validation, admission, routing, and the staged
//! single-pass pipeline (embed → parallel retrieval → fuse → rerank →
//! assemble) with the semantic cache interposed in front of the embedding,
//! fusion, and rerank stages.
//!
//! Stage failures degrade instead of failing the request: a lost index leg
//! falls back to the surviving ranking, a rerank overrun falls back to fused
//! order, a cache outage is a miss. Only invalid input and total budget
//! exhaustion (no index answered at all) surface as errors.

pub mod error;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::EngineError;
pub use types::{
    LatencyBreakdown, QueryRequest, QueryResponse, ReadyReport, ResponseCandidate,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::assemble::{self, AssembledContext};
use crate::cache::{CacheBackend, CachePolicy, CacheTier, SemanticCache};
use crate::constants::{
    CACHE_SCHEMA_VERSION, DEFAULT_ASSEMBLY_BUDGET, DEFAULT_FINAL_K, DEFAULT_FUSED_TOP_N,
    DEFAULT_FUSION_BUDGET, DEFAULT_RERANK_BUDGET, DEFAULT_RETRIEVAL_BUDGET, DEFAULT_RRF_K,
    DEFAULT_STAGE_TOP_N, DEFAULT_TENANT_ADMISSION_LIMIT, DEFAULT_TOKEN_BUDGET,
    DEFAULT_TOTAL_BUDGET, EMBEDDING_TIER_TTL, FUSED_TIER_TTL, MAX_QUERY_BYTES,
    RERANKED_TIER_TTL,
};
use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::fusion::{self, Candidate};
use crate::hashing;
use crate::index::{IndexResult, LexicalIndexClient, RankedDoc, VectorIndexClient};
use crate::orchestrator::{Orchestrator, OrchestratorConfig, RetrievalPass, SubqueryRetriever};
use crate::rerank::{CrossEncoderClient, RerankResult, RerankerClient};
use crate::router::{self, RouteDecision};

/// Tunables for one engine instance. Per-request overrides (`top_k`,
/// `max_latency_ms`) are clamped against these.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub rrf_k: u32,
    pub stage_top_n: usize,
    pub fused_top_n: usize,
    pub final_k: usize,
    pub total_budget: Duration,
    pub retrieval_budget: Duration,
    pub rerank_budget: Duration,
    pub token_budget: usize,
    pub tenant_admission_limit: usize,
    pub orchestrator: OrchestratorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            stage_top_n: DEFAULT_STAGE_TOP_N,
            fused_top_n: DEFAULT_FUSED_TOP_N,
            final_k: DEFAULT_FINAL_K,
            total_budget: DEFAULT_TOTAL_BUDGET,
            retrieval_budget: DEFAULT_RETRIEVAL_BUDGET,
            rerank_budget: DEFAULT_RERANK_BUDGET,
            token_budget: DEFAULT_TOKEN_BUDGET,
            tenant_admission_limit: DEFAULT_TENANT_ADMISSION_LIMIT,
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// Side-channel for stage metrics computed inside cache closures, so a fused
/// cache hit still reports zero retrieval time instead of a stale one.
#[derive(Default)]
struct PassSide {
    retrieval_ms: AtomicU64,
    fusion_ms: AtomicU64,
    embedding_hit: AtomicBool,
}

/// Fused-stage outcome that must not be cached.
enum FusedFailure {
    /// A leg was lost; the surviving ranking is usable but degraded.
    Partial(Vec<Candidate>),
    /// Nothing answered; surfaces to the caller.
    Fatal(EngineError),
}

impl std::fmt::Display for FusedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FusedFailure::Partial(c) => write!(f, "partial retrieval ({} candidates)", c.len()),
            FusedFailure::Fatal(e) => write!(f, "{e}"),
        }
    }
}

/// Rerank fallback result, routed around the cache via the error channel so
/// degraded orderings are never stored.
struct DegradedRerank(Vec<Candidate>);

impl std::fmt::Display for DegradedRerank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rerank degraded to fused order ({} candidates)", self.0.len())
    }
}

/// One single-pass run, before assembly.
struct SinglePassOutcome {
    candidates: Vec<Candidate>,
    degraded: bool,
    hit_tiers: Vec<CacheTier>,
    retrieval_ms: u64,
    fusion_ms: u64,
    rerank_ms: u64,
}

/// The engine. Generic over its five external seams so tests run entirely on
/// in-process mocks.
pub struct RetrievalEngine<L, V, E, C, B>
where
    L: LexicalIndexClient,
    V: VectorIndexClient,
    E: EmbeddingClient,
    C: CrossEncoderClient,
    B: CacheBackend,
{
    lexical: L,
    vector: V,
    embedder: E,
    reranker: RerankerClient<C>,
    cache: SemanticCache<B>,
    config: PipelineConfig,
    admissions: Mutex<HashMap<u64, Arc<Semaphore>>>,
}

impl<L, V, E, C, B> RetrievalEngine<L, V, E, C, B>
where
    L: LexicalIndexClient,
    V: VectorIndexClient,
    E: EmbeddingClient,
    C: CrossEncoderClient,
    B: CacheBackend,
{
    pub fn new(
        lexical: L,
        vector: V,
        embedder: E,
        reranker: RerankerClient<C>,
        cache: SemanticCache<B>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            lexical,
            vector,
            embedder,
            reranker,
            cache,
            config,
            admissions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The cache front, exposed for invalidation endpoints.
    pub fn cache(&self) -> &SemanticCache<B> {
        &self.cache
    }

    pub fn lexical(&self) -> &L {
        &self.lexical
    }

    pub fn vector(&self) -> &V {
        &self.vector
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn reranker(&self) -> &RerankerClient<C> {
        &self.reranker
    }

    /// Readiness of every external dependency.
    pub async fn readiness(&self) -> ReadyReport {
        let (lexical, vector, embedder, reranker, cache) = tokio::join!(
            self.lexical.is_ready(),
            self.vector.is_ready(),
            self.embedder.is_ready(),
            self.reranker.transport().is_ready(),
            self.cache.is_ready(),
        );
        ReadyReport {
            lexical,
            vector,
            embedder,
            reranker,
            cache,
        }
    }

    /// Runs one query end to end.
    #[instrument(skip(self, request), fields(tenant = %request.tenant_id))]
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse, EngineError> {
        let started = Instant::now();
        let query_text = validate(&request)?;

        let trace_id = request
            .trace_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let tenant_hash = hashing::hash_tenant_id(request.tenant_id.trim());
        let final_k = request.top_k.unwrap_or(self.config.final_k).max(1);

        let total_budget = request
            .max_latency_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.total_budget)
            .min(self.config.total_budget);
        let deadline = started + total_budget;

        let _permit = self.admit(tenant_hash, deadline).await?;

        let route = router::classify(query_text);
        let multihop = request.enable_multihop && route == RouteDecision::Complex;
        debug!(route = %route, multihop, trace_id = %trace_id, "request admitted");

        let response = if multihop {
            self.run_multihop(
                query_text,
                tenant_hash,
                request.cache_policy,
                final_k,
                deadline,
                route,
                trace_id,
                started,
            )
            .await?
        } else {
            let outcome = self
                .single_pass(query_text, tenant_hash, request.cache_policy, final_k, deadline)
                .await?;
            self.finish(outcome, route, trace_id, started, 0, false)
        };

        info!(
            trace_id = %response.trace_id,
            route = %response.route,
            candidates = response.candidates.len(),
            degraded = response.degraded,
            low_confidence = response.low_confidence,
            total_ms = response.latency_breakdown.total_ms,
            "query complete"
        );
        Ok(response)
    }

    /// One embed → retrieve → fuse → rerank pass, cache tiers interposed.
    async fn single_pass(
        &self,
        query_text: &str,
        tenant_hash: u64,
        policy: CachePolicy,
        final_k: usize,
        deadline: Instant,
    ) -> Result<SinglePassOutcome, EngineError> {
        let mut hit_tiers = Vec::new();
        let mut degraded = false;
        let side = PassSide::default();
        let bypass = policy.bypass_result_tiers();

        let params = hashing::params_hash(
            self.config.rrf_k,
            self.config.stage_top_n,
            self.config.fused_top_n,
        );
        let fused_key =
            hashing::fused_key(tenant_hash, query_text, params, CACHE_SCHEMA_VERSION);

        let fused = if bypass {
            match self
                .compute_fused(query_text, tenant_hash, deadline, &side)
                .await
            {
                Ok(candidates) => candidates,
                Err(FusedFailure::Partial(candidates)) => {
                    degraded = true;
                    candidates
                }
                Err(FusedFailure::Fatal(e)) => return Err(e),
            }
        } else {
            let result = self
                .cache
                .get_or_compute::<Vec<Candidate>, FusedFailure, _, _>(
                    CacheTier::Fused,
                    &fused_key,
                    FUSED_TIER_TTL,
                    Some(tenant_hash),
                    || self.compute_fused(query_text, tenant_hash, deadline, &side),
                )
                .await;
            match result {
                Ok((candidates, outcome)) => {
                    if outcome.is_hit() {
                        hit_tiers.push(CacheTier::Fused);
                    }
                    candidates
                }
                Err(FusedFailure::Partial(candidates)) => {
                    degraded = true;
                    candidates
                }
                Err(FusedFailure::Fatal(e)) => return Err(e),
            }
        };
        if side.embedding_hit.load(Ordering::Relaxed) {
            hit_tiers.push(CacheTier::Embedding);
        }

        let rerank_started = Instant::now();
        let mut ranked = self
            .rerank_stage(query_text, fused, bypass, deadline, &mut hit_tiers, &mut degraded)
            .await;
        let rerank_ms = rerank_started.elapsed().as_millis() as u64;
        ranked.truncate(final_k);

        Ok(SinglePassOutcome {
            candidates: ranked,
            degraded,
            hit_tiers,
            retrieval_ms: side.retrieval_ms.load(Ordering::Relaxed),
            fusion_ms: side.fusion_ms.load(Ordering::Relaxed),
            rerank_ms,
        })
    }

    /// Embedding (through its cache tier), parallel index legs with
    /// individual timeouts, then RRF fusion.
    async fn compute_fused(
        &self,
        query_text: &str,
        tenant_hash: u64,
        deadline: Instant,
        side: &PassSide,
    ) -> Result<Vec<Candidate>, FusedFailure> {
        let embedding_key = hashing::embedding_key(query_text, self.embedder.model_version());
        let embedding = match self
            .cache
            .get_or_compute::<Vec<f32>, EmbeddingError, _, _>(
                CacheTier::Embedding,
                &embedding_key,
                EMBEDDING_TIER_TTL,
                None,
                || self.embedder.embed(query_text),
            )
            .await
        {
            Ok((vector, outcome)) => {
                if outcome.is_hit() {
                    side.embedding_hit.store(true, Ordering::Relaxed);
                }
                Some(vector)
            }
            Err(e) => {
                warn!(error = %e, "embedding failed, skipping vector leg");
                None
            }
        };
        let embedding_lost = embedding.is_none();

        let retrieval_window = self
            .config
            .retrieval_budget
            .min(deadline.saturating_duration_since(Instant::now()));
        if retrieval_window.is_zero() {
            return Err(FusedFailure::Fatal(EngineError::PipelineTimeout));
        }

        let retrieval_started = Instant::now();
        let lexical_fut = tokio::time::timeout(
            retrieval_window,
            self.lexical
                .search(query_text, tenant_hash, self.config.stage_top_n),
        );
        let vector_fut = async {
            match embedding {
                Some(embedding) => Some(
                    tokio::time::timeout(
                        retrieval_window,
                        self.vector
                            .search(embedding, tenant_hash, self.config.stage_top_n),
                    )
                    .await,
                ),
                None => None,
            }
        };
        let (lexical_leg, vector_leg) = tokio::join!(lexical_fut, vector_fut);
        side.retrieval_ms.store(
            retrieval_started.elapsed().as_millis() as u64,
            Ordering::Relaxed,
        );

        let lexical_docs = flatten_leg("lexical", lexical_leg);
        let vector_docs = vector_leg.and_then(|leg| flatten_leg("vector", leg));

        let lexical_lost = lexical_docs.is_none();
        let vector_lost = !embedding_lost && vector_docs.is_none();
        if lexical_lost && (embedding_lost || vector_lost) {
            return Err(FusedFailure::Fatal(EngineError::IndexUnavailable {
                message: "neither index produced a ranking within budget".to_string(),
            }));
        }

        let lexical_docs = lexical_docs.unwrap_or_default();
        let vector_docs = vector_docs.unwrap_or_default();

        let fusion_started = Instant::now();
        let fused = fusion::fuse(
            &lexical_docs,
            &vector_docs,
            self.config.rrf_k,
            self.config.fused_top_n,
        );
        let fusion_elapsed = fusion_started.elapsed();
        side.fusion_ms
            .store(fusion_elapsed.as_millis() as u64, Ordering::Relaxed);
        debug!(
            lexical = lexical_docs.len(),
            vector = vector_docs.len(),
            fused = fused.len(),
            "fusion complete"
        );
        if fusion_elapsed > DEFAULT_FUSION_BUDGET {
            warn!(
                fusion_ms = fusion_elapsed.as_millis() as u64,
                "fusion overran its budget share"
            );
        }

        if lexical_lost || vector_lost || embedding_lost {
            Err(FusedFailure::Partial(fused))
        } else {
            Ok(fused)
        }
    }

    /// Rerank with the remaining budget, through the reranked tier unless
    /// bypassed. The full scored list is cached (untruncated) so requests
    /// with different `top_k` share entries; degraded and budget-shrunk
    /// orderings are not stored.
    async fn rerank_stage(
        &self,
        query_text: &str,
        fused: Vec<Candidate>,
        bypass: bool,
        deadline: Instant,
        hit_tiers: &mut Vec<CacheTier>,
        degraded: &mut bool,
    ) -> Vec<Candidate> {
        let rerank_window = self
            .config
            .rerank_budget
            .min(deadline.saturating_duration_since(Instant::now()));
        let keep_all = fused.len();

        if bypass {
            let (candidates, fallback) = self
                .reranker
                .rerank(query_text, fused, keep_all, rerank_window)
                .await
                .into_parts();
            *degraded |= fallback.is_some();
            return candidates;
        }

        let ids: Vec<&str> = fused.iter().map(|c| c.chunk_id.as_str()).collect();
        let reranked_key = hashing::reranked_key(
            query_text,
            hashing::candidate_set_hash(&ids),
            self.reranker.model_version(),
        );

        let result = self
            .cache
            .get_or_compute::<Vec<Candidate>, DegradedRerank, _, _>(
                CacheTier::Reranked,
                &reranked_key,
                RERANKED_TIER_TTL,
                None,
                || async {
                    match self
                        .reranker
                        .rerank(query_text, fused, keep_all, rerank_window)
                        .await
                    {
                        RerankResult::Reranked(candidates) => Ok(candidates),
                        // Budget-shrunk coverage is usable now but must not be
                        // served to later, well-budgeted requests as a hit.
                        RerankResult::Partial(candidates) => {
                            debug!("rerank pass budget-shrunk, not cached");
                            Err(DegradedRerank(candidates))
                        }
                        RerankResult::FusedOrder(candidates, fallback) => {
                            debug!(reason = ?fallback, "rerank pass degraded");
                            Err(DegradedRerank(candidates))
                        }
                    }
                },
            )
            .await;

        match result {
            Ok((candidates, outcome)) => {
                if outcome.is_hit() {
                    hit_tiers.push(CacheTier::Reranked);
                }
                candidates
            }
            Err(DegradedRerank(candidates)) => {
                *degraded = true;
                candidates
            }
        }
    }

    /// Multi-hop path: the orchestrator drives `single_pass` per subquery.
    #[allow(clippy::too_many_arguments)]
    async fn run_multihop(
        &self,
        query_text: &str,
        tenant_hash: u64,
        policy: CachePolicy,
        final_k: usize,
        deadline: Instant,
        route: RouteDecision,
        trace_id: String,
        started: Instant,
    ) -> Result<QueryResponse, EngineError> {
        let retriever = EngineRetriever {
            engine: self,
            tenant_hash,
            policy,
            deadline,
            stats: Mutex::new(HopStats::default()),
        };
        let orchestrator = Orchestrator::new(retriever, self.config.orchestrator.clone());
        let budget = deadline.saturating_duration_since(Instant::now());
        let hop = orchestrator.run(query_text, budget).await;

        let stats = orchestrator.retriever().stats.lock().clone();
        let mut candidates = merge_candidates(hop.candidates);
        candidates.truncate(final_k);

        let outcome = SinglePassOutcome {
            candidates,
            degraded: hop.degraded,
            hit_tiers: stats.hit_tiers,
            retrieval_ms: stats.retrieval_ms,
            fusion_ms: stats.fusion_ms,
            rerank_ms: stats.rerank_ms,
        };
        Ok(self.finish(outcome, route, trace_id, started, hop.iterations, hop.low_confidence))
    }

    /// Assembly plus response construction, shared by both paths.
    fn finish(
        &self,
        outcome: SinglePassOutcome,
        route: RouteDecision,
        trace_id: String,
        started: Instant,
        orchestrator_iterations: u32,
        low_confidence: bool,
    ) -> QueryResponse {
        let assembly_started = Instant::now();
        let context: AssembledContext =
            assemble::assemble(&outcome.candidates, self.config.token_budget);
        let assembly_ms = assembly_started.elapsed().as_millis() as u64;
        if assembly_started.elapsed() > DEFAULT_ASSEMBLY_BUDGET {
            warn!(assembly_ms, "assembly overran its budget share");
        }

        let candidates = outcome
            .candidates
            .iter()
            .enumerate()
            .map(|(i, c)| ResponseCandidate {
                chunk_id: c.chunk_id.clone(),
                score: c.final_score(),
                rank: i + 1,
                citation: context
                    .citations
                    .iter()
                    .find(|cit| cit.chunk_id == c.chunk_id)
                    .cloned(),
            })
            .collect();

        QueryResponse {
            trace_id,
            route,
            candidates,
            context,
            degraded: outcome.degraded,
            low_confidence,
            cache_hit_tiers: tier_names(&outcome.hit_tiers),
            latency_breakdown: LatencyBreakdown {
                total_ms: started.elapsed().as_millis() as u64,
                retrieval_ms: outcome.retrieval_ms,
                fusion_ms: outcome.fusion_ms,
                rerank_ms: outcome.rerank_ms,
                assembly_ms,
                orchestrator_iterations,
            },
        }
    }

    /// Per-tenant admission: a bounded wait on the tenant's semaphore,
    /// capped by the request deadline.
    async fn admit(
        &self,
        tenant_hash: u64,
        deadline: Instant,
    ) -> Result<OwnedSemaphorePermit, EngineError> {
        let semaphore = self
            .admissions
            .lock()
            .entry(tenant_hash)
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.tenant_admission_limit)))
            .clone();

        let wait = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(wait, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) | Err(_) => Err(EngineError::PipelineTimeout),
        }
    }
}

/// Per-request multi-hop accumulators, shared across subquery passes.
#[derive(Debug, Default, Clone)]
struct HopStats {
    hit_tiers: Vec<CacheTier>,
    retrieval_ms: u64,
    fusion_ms: u64,
    rerank_ms: u64,
}

/// Borrowing adapter that lets the orchestrator call back into the engine.
struct EngineRetriever<'a, L, V, E, C, B>
where
    L: LexicalIndexClient,
    V: VectorIndexClient,
    E: EmbeddingClient,
    C: CrossEncoderClient,
    B: CacheBackend,
{
    engine: &'a RetrievalEngine<L, V, E, C, B>,
    tenant_hash: u64,
    policy: CachePolicy,
    deadline: Instant,
    stats: Mutex<HopStats>,
}

impl<L, V, E, C, B> SubqueryRetriever for EngineRetriever<'_, L, V, E, C, B>
where
    L: LexicalIndexClient,
    V: VectorIndexClient,
    E: EmbeddingClient,
    C: CrossEncoderClient,
    B: CacheBackend,
{
    type Error = EngineError;

    async fn retrieve(
        &self,
        query_text: &str,
        _budget: Duration,
    ) -> Result<RetrievalPass, EngineError> {
        // Subquery passes keep the wider fused pool; the merged result is
        // truncated once at the end.
        let outcome = self
            .engine
            .single_pass(
                query_text,
                self.tenant_hash,
                self.policy,
                self.engine.config.fused_top_n,
                self.deadline,
            )
            .await?;

        let mut stats = self.stats.lock();
        stats.hit_tiers.extend(outcome.hit_tiers.iter().copied());
        stats.retrieval_ms += outcome.retrieval_ms;
        stats.fusion_ms += outcome.fusion_ms;
        stats.rerank_ms += outcome.rerank_ms;
        drop(stats);

        Ok(RetrievalPass {
            candidates: outcome.candidates,
            degraded: outcome.degraded,
        })
    }
}

fn validate(request: &QueryRequest) -> Result<&str, EngineError> {
    let query_text = request.query_text.trim();
    if query_text.is_empty() {
        return Err(EngineError::Validation {
            message: "query_text is empty".to_string(),
        });
    }
    if request.query_text.len() > MAX_QUERY_BYTES {
        return Err(EngineError::Validation {
            message: format!("query_text exceeds {MAX_QUERY_BYTES} bytes"),
        });
    }
    if request.tenant_id.trim().is_empty() {
        return Err(EngineError::Validation {
            message: "tenant_id is empty".to_string(),
        });
    }
    Ok(query_text)
}

/// Collapses a timed index leg into its docs, logging the loss.
fn flatten_leg(
    backend: &'static str,
    leg: Result<IndexResult<Vec<RankedDoc>>, tokio::time::error::Elapsed>,
) -> Option<Vec<RankedDoc>> {
    match leg {
        Ok(Ok(docs)) => Some(docs),
        Ok(Err(e)) => {
            warn!(backend, error = %e, "index leg failed");
            None
        }
        Err(_) => {
            warn!(backend, "index leg timed out");
            None
        }
    }
}

/// Dedupes by chunk id (keeping the best-scored instance) and orders by
/// final score, for the multi-hop merged pool.
fn merge_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match merged.iter_mut().find(|c| c.chunk_id == candidate.chunk_id) {
            Some(existing) => {
                if candidate.final_score() > existing.final_score() {
                    *existing = candidate;
                }
            }
            None => merged.push(candidate),
        }
    }
    merged.sort_by(|a, b| {
        b.final_score()
            .partial_cmp(&a.final_score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    merged
}

/// Tier names for the response, deduplicated in tier order.
fn tier_names(tiers: &[CacheTier]) -> Vec<String> {
    [CacheTier::Embedding, CacheTier::Fused, CacheTier::Reranked]
        .into_iter()
        .filter(|tier| tiers.contains(tier))
        .map(|tier| tier.as_str().to_string())
        .collect()
}
