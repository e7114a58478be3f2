use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three cache tiers, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    /// Query text → embedding vector.
    Embedding,
    /// (tenant, query, params) → post-fusion candidate list.
    Fused,
    /// (query, candidate set) → reranked candidate list.
    Reranked,
}

impl CacheTier {
    /// Stable name used in logs and the `cache_hit_tiers` response field.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Embedding => "embedding",
            CacheTier::Fused => "fused",
            CacheTier::Reranked => "reranked",
        }
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How one tier behaved for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from cache (including coalesced waiters).
    Hit,
    /// Computed and stored.
    Miss,
    /// Tier skipped by policy; nothing read or written.
    Bypass,
}

impl CacheOutcome {
    /// Returns `true` for [`CacheOutcome::Hit`].
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit)
    }
}

/// Stored cache entry. The layout (key, serialized value, created_at, ttl) is
/// part of the external contract so invalidation tooling can interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Composed key (see [`crate::hashing`] for the normative layouts).
    pub key: String,
    /// Serialized value (JSON).
    pub value: Vec<u8>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Time-to-live from `created_at`.
    pub ttl: Duration,
    /// Tenant hash for tenant-scoped tiers; `None` for shared tiers.
    pub tenant_id: Option<u64>,
}

impl CacheEntry {
    /// Creates an entry stamped `now`.
    pub fn new(key: String, value: Vec<u8>, ttl: Duration, tenant_id: Option<u64>) -> Self {
        Self {
            key,
            value,
            created_at: Utc::now(),
            ttl,
            tenant_id,
        }
    }

    /// Returns `true` once the TTL has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now >= self.created_at + ttl,
            Err(_) => false,
        }
    }
}

/// Caller-supplied flags deciding whether the result tiers may be used.
///
/// The embedding tier is always safe (keys carry no tenant data and values are
/// pure functions of text), so bypass only covers the fused/reranked tiers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Request content is PII-sensitive.
    #[serde(default)]
    pub pii_sensitive: bool,
    /// Request is authenticated / user-specific.
    #[serde(default)]
    pub authenticated: bool,
    /// Request targets a safety or admin route.
    #[serde(default)]
    pub admin_route: bool,
}

impl CachePolicy {
    /// Returns `true` when the fused and reranked tiers must be skipped.
    pub fn bypass_result_tiers(&self) -> bool {
        self.pii_sensitive || self.authenticated || self.admin_route
    }
}
