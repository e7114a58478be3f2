//! Three-tier semantic cache: embedding, fused results, reranked results.
//!
//! Each tier has its own key layout (see [`crate::hashing`]), TTL, and
//! invalidation unit. Isolation between tenants is structural — tenant-scoped
//! keys carry a tenant hash prefix, so cross-tenant reads cannot be expressed.
//! The cache fails open: a broken backend degrades every lookup to a miss.

mod backend;
mod error;
mod semantic;
mod types;


pub use backend::{CacheBackend, InMemoryBackend};
pub use error::{CacheError, CacheResult};
pub use semantic::{CacheStats, SemanticCache};
pub use types::{CacheEntry, CacheOutcome, CachePolicy, CacheTier};

#[cfg(any(test, feature = "mock"))]
pub use backend::MockCacheBackend;
