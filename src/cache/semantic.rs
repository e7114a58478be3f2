//! Three-tier semantic cache with single-flight coalescing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::types::{CacheEntry, CacheOutcome, CacheTier};
use crate::hashing;

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time hit/miss counts per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub embedding_hits: u64,
    pub embedding_misses: u64,
    pub fused_hits: u64,
    pub fused_misses: u64,
    pub reranked_hits: u64,
    pub reranked_misses: u64,
}

/// Cache front sitting before embedding, fusion, and reranking.
///
/// Tenant isolation is enforced by key construction (see [`crate::hashing`]),
/// never by a runtime check. Backend failures are unconditional misses: the
/// pipeline must never block on the cache. Coalescing is per key — N
/// concurrent callers with the same key share one computation.
pub struct SemanticCache<B: CacheBackend> {
    backend: B,
    flights: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    embedding: TierCounters,
    fused: TierCounters,
    reranked: TierCounters,
}

impl<B: CacheBackend> std::fmt::Debug for SemanticCache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticCache")
            .field("in_flight", &self.flights.lock().len())
            .finish_non_exhaustive()
    }
}

impl<B: CacheBackend> SemanticCache<B> {
    /// Wraps a backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            flights: Mutex::new(HashMap::new()),
            embedding: TierCounters::default(),
            fused: TierCounters::default(),
            reranked: TierCounters::default(),
        }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns `true` if the backend is usable.
    pub async fn is_ready(&self) -> bool {
        self.backend.is_ready().await
    }

    /// Snapshot of per-tier hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            embedding_hits: self.embedding.hits.load(Ordering::Relaxed),
            embedding_misses: self.embedding.misses.load(Ordering::Relaxed),
            fused_hits: self.fused.hits.load(Ordering::Relaxed),
            fused_misses: self.fused.misses.load(Ordering::Relaxed),
            reranked_hits: self.reranked.hits.load(Ordering::Relaxed),
            reranked_misses: self.reranked.misses.load(Ordering::Relaxed),
        }
    }

    /// Looks up `key`, computing and storing on miss.
    ///
    /// Concurrent calls with an identical key block on one in-flight
    /// computation: the winner runs `compute`, the rest re-check the backend
    /// once the winner stores. Compute errors propagate to their caller and
    /// are never cached. If the winner is cancelled mid-compute, its flight
    /// lock releases and a waiter takes over — partial work is never stored
    /// as a hit.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        tier: CacheTier,
        key: &str,
        ttl: Duration,
        tenant_id: Option<u64>,
        compute: F,
    ) -> Result<(T, CacheOutcome), E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.read_backend::<T>(tier, key).await {
            self.counters(tier).hits.fetch_add(1, Ordering::Relaxed);
            debug!(tier = %tier, key = key, "cache hit");
            return Ok((value, CacheOutcome::Hit));
        }

        let flight = self.flight_for(key);
        // Declared before the lock so cancellation anywhere past this point
        // (waiting included) still removes the map entry on drop.
        let _release = FlightGuard {
            flights: &self.flights,
            key,
            flight: &flight,
        };
        let _guard = flight.lock().await;

        // A coalesced waiter lands here after the winner stored; its second
        // read is the shared result.
        if let Some(value) = self.read_backend::<T>(tier, key).await {
            self.counters(tier).hits.fetch_add(1, Ordering::Relaxed);
            debug!(tier = %tier, key = key, "cache hit (coalesced)");
            return Ok((value, CacheOutcome::Hit));
        }

        let result = compute().await;
        self.counters(tier).misses.fetch_add(1, Ordering::Relaxed);

        match &result {
            Ok(value) => {
                self.write_backend(key, value, ttl, tenant_id).await;
                debug!(tier = %tier, key = key, "cache miss, stored");
            }
            Err(_) => {
                debug!(tier = %tier, key = key, "cache miss, compute failed");
            }
        }

        result.map(|value| (value, CacheOutcome::Miss))
    }

    /// Purges every fused-tier entry belonging to one tenant
    /// (legal-hold / deletion event).
    pub async fn purge_tenant(&self, tenant_hash: u64) {
        self.purge(&hashing::fused_tenant_prefix(tenant_hash)).await;
    }

    /// Purges every embedding-tier entry for one model version.
    pub async fn purge_embedding_model(&self, model_version: &str) {
        self.purge(&hashing::embedding_model_prefix(model_version))
            .await;
    }

    /// Purges every reranked-tier entry for one model version.
    pub async fn purge_rerank_model(&self, model_version: &str) {
        self.purge(&hashing::reranked_model_prefix(model_version))
            .await;
    }

    /// Purges all tiers (data-contract version bump).
    pub async fn purge_all(&self) {
        if let Err(e) = self.backend.purge_all().await {
            warn!(error = %e, "cache purge_all failed");
        }
    }

    async fn purge(&self, prefix: &str) {
        match self.backend.purge_prefix(prefix).await {
            Ok(()) => debug!(prefix = prefix, "cache prefix purged"),
            Err(e) => warn!(prefix = prefix, error = %e, "cache purge failed"),
        }
    }

    fn counters(&self, tier: CacheTier) -> &TierCounters {
        match tier {
            CacheTier::Embedding => &self.embedding,
            CacheTier::Fused => &self.fused,
            CacheTier::Reranked => &self.reranked,
        }
    }

    /// Backend read with fail-open semantics: any error is a miss.
    async fn read_backend<T: DeserializeOwned>(&self, tier: CacheTier, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(entry)) => match serde_json::from_slice(&entry.value) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(tier = %tier, key = key, error = %e, "cached value undecodable, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(tier = %tier, key = key, error = %e, "cache backend error, treating as miss");
                None
            }
        }
    }

    async fn write_backend<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        tenant_id: Option<u64>,
    ) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = key, error = %e, "cache value serialization failed, skipping store");
                return;
            }
        };

        let entry = CacheEntry::new(key.to_string(), bytes, ttl, tenant_id);
        if let Err(e) = self.backend.put(entry).await {
            warn!(key = key, error = %e, "cache store failed");
        }
    }

    fn flight_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut flights = self.flights.lock();
        flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }
}

/// Removes a flight entry when its last participant leaves, whether it
/// returned normally or was cancelled mid-compute.
struct FlightGuard<'a> {
    flights: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    key: &'a str,
    flight: &'a Arc<tokio::sync::Mutex<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock();
        // Two strong refs mean only the map and this caller hold the lock;
        // the last participant removes the entry so the map stays bounded.
        if let Some(current) = flights.get(self.key) {
            if Arc::ptr_eq(current, self.flight) && Arc::strong_count(current) <= 2 {
                flights.remove(self.key);
            }
        }
    }
}
