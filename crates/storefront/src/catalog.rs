//! Read-through catalog cache.
//!
//! Slices of the catalog are cached by the exact [`SearchFilter`] that
//! selected them, using `moka` with a time-to-live (5 minutes by default).
//! The TTL counts from when a slice was fetched, so putting a slice back
//! after a rollback does not extend its life.
//! Any successful inventory mutation drops every cached slice.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use sweetshop_core::{SearchFilter, Sweet};
use tracing::{debug, instrument};

use crate::api::{ApiError, ShopBackend};

/// Cached slices, keyed by the filter that produced them.
pub type CatalogSnapshot = HashMap<SearchFilter, CachedSlice>;

/// One catalog slice and when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSlice {
    pub items: Vec<Sweet>,
    pub fetched_at: Instant,
}

impl CachedSlice {
    /// A slice fetched just now.
    #[must_use]
    pub fn fresh(items: Vec<Sweet>) -> Self {
        Self {
            items,
            fetched_at: Instant::now(),
        }
    }
}

/// Expires a slice `ttl` after its fetch time, however often it is re-inserted.
struct SinceFetched {
    ttl: Duration,
}

impl SinceFetched {
    fn remaining(&self, slice: &CachedSlice, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(slice.fetched_at))
    }
}

impl Expiry<SearchFilter, CachedSlice> for SinceFetched {
    fn expire_after_create(
        &self,
        _key: &SearchFilter,
        value: &CachedSlice,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(self.remaining(value, created_at))
    }

    fn expire_after_update(
        &self,
        _key: &SearchFilter,
        value: &CachedSlice,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.remaining(value, updated_at))
    }
}

const MAX_CACHED_SLICES: u64 = 1000;

/// Catalog slices cached by filter.
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct CatalogCache {
    cache: Cache<SearchFilter, CachedSlice>,
}

impl CatalogCache {
    /// Create an empty cache whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_CACHED_SLICES)
            .expire_after(SinceFetched { ttl })
            .build();
        Self { cache }
    }

    /// Cached slice for `filter`, if present and fresh.
    pub async fn get(&self, filter: &SearchFilter) -> Option<Vec<Sweet>> {
        self.cache.get(filter).await.map(|slice| slice.items)
    }

    /// Store a slice fetched just now.
    pub async fn insert(&self, filter: SearchFilter, items: Vec<Sweet>) {
        self.cache.insert(filter, CachedSlice::fresh(items)).await;
    }

    /// Fetch the slice for `filter`, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns the backend's error on a cache miss that fails to fetch.
    #[instrument(skip(self, backend))]
    pub async fn fetch(
        &self,
        backend: &dyn ShopBackend,
        filter: &SearchFilter,
    ) -> Result<Vec<Sweet>, ApiError> {
        if let Some(items) = self.get(filter).await {
            debug!("Cache hit for catalog slice");
            return Ok(items);
        }

        let items = backend.list_sweets(filter).await?;
        self.insert(filter.clone(), items.clone()).await;
        Ok(items)
    }

    /// Drop every cached slice. Idempotent.
    pub async fn invalidate_all(&self) {
        let keys: Vec<SearchFilter> = self.cache.iter().map(|(k, _)| (*k).clone()).collect();
        for key in &keys {
            self.cache.invalidate(key).await;
        }
        self.cache.run_pending_tasks().await;
        debug!(slices = keys.len(), "Catalog cache invalidated");
    }

    /// Every cached slice.
    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.cache.run_pending_tasks().await;
        self.cache
            .iter()
            .map(|(k, v)| ((*k).clone(), v))
            .collect()
    }

    /// Make the cache hold exactly `snapshot`.
    ///
    /// Slices keep their original fetch time, so one that has outlived the
    /// TTL in the meantime is dropped rather than revived.
    pub async fn restore(&self, snapshot: CatalogSnapshot) {
        let stale: Vec<SearchFilter> = self
            .cache
            .iter()
            .map(|(k, _)| (*k).clone())
            .filter(|k| !snapshot.contains_key(k))
            .collect();
        for key in &stale {
            self.cache.invalidate(key).await;
        }
        for (filter, items) in snapshot {
            self.cache.insert(filter, items).await;
        }
        self.cache.run_pending_tasks().await;
    }
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::api::{InMemoryBackend, Operation};

    fn backend() -> InMemoryBackend {
        InMemoryBackend::seeded(SecretString::from("test-signing-secret"))
    }

    #[tokio::test]
    async fn test_fetch_is_read_through() {
        let backend = backend();
        let cache = CatalogCache::default();
        let filter = SearchFilter::all().with_category("Cakes");

        let first = cache.fetch(&backend, &filter).await.unwrap();
        let second = cache.fetch(&backend, &filter).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.call_count(Operation::ListSweets), 1);
    }

    #[tokio::test]
    async fn test_distinct_filters_are_distinct_keys() {
        let backend = backend();
        let cache = CatalogCache::default();

        cache.fetch(&backend, &SearchFilter::all()).await.unwrap();
        cache
            .fetch(&backend, &SearchFilter::all().with_query("gummy"))
            .await
            .unwrap();

        assert_eq!(backend.call_count(Operation::ListSweets), 2);
        assert_eq!(cache.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_twice_same_as_once() {
        let backend = backend();
        let cache = CatalogCache::default();
        let filter = SearchFilter::all();

        cache.fetch(&backend, &filter).await.unwrap();
        cache.invalidate_all().await;
        let once = cache.fetch(&backend, &filter).await.unwrap();

        cache.invalidate_all().await;
        cache.invalidate_all().await;
        let twice = cache.fetch(&backend, &filter).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(backend.call_count(Operation::ListSweets), 3);
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_cached() {
        let backend = backend();
        let cache = CatalogCache::default();
        backend.fail_next(
            Operation::ListSweets,
            ApiError::Network("connection refused".to_string()),
        );

        assert!(cache.fetch(&backend, &SearchFilter::all()).await.is_err());
        assert!(cache.get(&SearchFilter::all()).await.is_none());
        assert!(cache.fetch(&backend, &SearchFilter::all()).await.is_ok());
    }

    #[tokio::test]
    async fn test_restore_replaces_contents() {
        let backend = backend();
        let cache = CatalogCache::default();
        cache.fetch(&backend, &SearchFilter::all()).await.unwrap();
        let saved = cache.snapshot().await;

        cache
            .fetch(&backend, &SearchFilter::all().with_category("Frozen"))
            .await
            .unwrap();
        cache.insert(SearchFilter::all(), Vec::new()).await;

        cache.restore(saved.clone()).await;
        assert_eq!(cache.snapshot().await, saved);
    }

    #[tokio::test]
    async fn test_restore_keeps_fetch_time() {
        let backend = backend();
        let cache = CatalogCache::new(Duration::from_secs(60));
        cache.fetch(&backend, &SearchFilter::all()).await.unwrap();
        let saved = cache.snapshot().await;

        cache.restore(saved.clone()).await;

        let restored = cache.snapshot().await;
        assert_eq!(
            restored.get(&SearchFilter::all()).unwrap().fetched_at,
            saved.get(&SearchFilter::all()).unwrap().fetched_at
        );
    }

    #[tokio::test]
    async fn test_restored_slice_past_ttl_is_not_revived() {
        let backend = backend();
        let cache = CatalogCache::new(Duration::from_secs(60));
        let items = backend.list_sweets(&SearchFilter::all()).await.unwrap();
        let stale = CachedSlice {
            items: items.clone(),
            fetched_at: Instant::now().checked_sub(Duration::from_secs(61)).unwrap(),
        };
        let recent = CachedSlice {
            items,
            fetched_at: Instant::now().checked_sub(Duration::from_secs(30)).unwrap(),
        };
        let cakes = SearchFilter::all().with_category("Cakes");

        cache
            .restore(CatalogSnapshot::from([
                (SearchFilter::all(), stale),
                (cakes.clone(), recent),
            ]))
            .await;

        assert!(cache.get(&SearchFilter::all()).await.is_none());
        assert!(cache.get(&cakes).await.is_some());
    }
}
