//! Cache backend contract and the default in-memory implementation.

use std::time::{Duration, Instant};

use chrono::Utc;
use moka::Expiry;
use moka::sync::Cache;

use super::error::{CacheError, CacheResult};
use super::types::CacheEntry;

/// Storage contract for cache entries.
///
/// The store is external from the engine's point of view; this trait is the
/// access contract. Implementations must enforce entry TTLs and support
/// prefix purges (the invalidation unit for tenants and model versions).
pub trait CacheBackend: Send + Sync {
    /// Fetches an unexpired entry.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = CacheResult<Option<CacheEntry>>> + Send;

    /// Stores an entry, replacing any previous value under the same key.
    fn put(&self, entry: CacheEntry) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Removes every entry whose key starts with `prefix`.
    fn purge_prefix(
        &self,
        prefix: &str,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Removes everything.
    fn purge_all(&self) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Returns `true` if the backend is usable.
    fn is_ready(&self) -> impl std::future::Future<Output = bool> + Send;
}

struct PerEntryExpiry;

impl Expiry<String, CacheEntry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-memory backend (moka) with per-entry TTL and LRU capacity eviction.
#[derive(Clone)]
pub struct InMemoryBackend {
    entries: Cache<String, CacheEntry>,
}

impl InMemoryBackend {
    const DEFAULT_CAPACITY: u64 = 100_000;

    /// Creates a backend with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates a backend with a max entry capacity.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryExpiry)
                .support_invalidation_closures()
                .build(),
        }
    }

    /// Returns the number of live entries (approximate until maintenance runs).
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Returns `true` if the backend holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.entry_count() == 0
    }

    /// Runs pending maintenance tasks (useful in tests after invalidation).
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let entry = self.entries.get(key);
        // moka evicts on its own schedule; the timestamp check makes expiry
        // exact at the read boundary.
        match entry {
            Some(entry) if entry.is_expired(Utc::now()) => {
                self.entries.remove(key);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(&self, entry: CacheEntry) -> CacheResult<()> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn purge_prefix(&self, prefix: &str) -> CacheResult<()> {
        let prefix = prefix.to_string();
        self.entries
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
            .map_err(|e| CacheError::PurgeFailed {
                message: e.to_string(),
            })?;
        self.entries.run_pending_tasks();
        Ok(())
    }

    async fn purge_all(&self) -> CacheResult<()> {
        self.entries.invalidate_all();
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

/// Backend wrapper with injectable unavailability, for fail-open tests.
#[cfg(any(test, feature = "mock"))]
pub struct MockCacheBackend {
    inner: InMemoryBackend,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "mock"))]
impl MockCacheBackend {
    /// Creates a healthy mock backend.
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Simulates backend unavailability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail
            .store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }

    fn check(&self) -> CacheResult<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            Err(CacheError::BackendUnavailable {
                message: "mock outage injected".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Returns the number of live entries in the wrapped store.
    pub fn len(&self) -> u64 {
        self.inner.len()
    }
}

#[cfg(any(test, feature = "mock"))]
impl Default for MockCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "mock"))]
impl CacheBackend for MockCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn put(&self, entry: CacheEntry) -> CacheResult<()> {
        self.check()?;
        self.inner.put(entry).await
    }

    async fn purge_prefix(&self, prefix: &str) -> CacheResult<()> {
        self.check()?;
        self.inner.purge_prefix(prefix).await
    }

    async fn purge_all(&self) -> CacheResult<()> {
        self.check()?;
        self.inner.purge_all().await
    }

    async fn is_ready(&self) -> bool {
        self.check().is_ok()
    }
}
