// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Caching wrapper for notas storage backends.
//
// Wraps any `StorageBackend` and keeps recently read or written documents in
// a bounded map. Reads are served from the map while an entry is younger than
// the TTL; misses (including "not found") are fetched from the wrapped
// backend and remembered. Writes and deletes go to the backend first and then
// refresh or drop the entry. Listings always go to the backend.
//
// Eviction removes the entry with the oldest insertion/refresh time. Access
// counts are tracked per entry but do not influence eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::backend::{BackendKind, StorageBackend};
use crate::document::Document;
use crate::error::StorageError;

/// Configuration for [`CacheBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the storage service wraps its backend in a cache.
    pub enabled: bool,
    /// Maximum number of cached ids.
    pub max_entries: usize,
    /// Age in seconds after which an entry is treated as a miss.
    pub ttl_seconds: u64,
}

impl CacheConfig {
    /// The TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100,
            ttl_seconds: 300,
        }
    }
}

/// Cache effectiveness counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Reads answered from the cache.
    pub hits: u64,
    /// Reads that went to the backend.
    pub misses: u64,
    /// Entries currently held.
    pub size: usize,
    /// `hits / (hits + misses)`, or 0.0 before the first read.
    pub hit_rate: f64,
}

#[derive(Debug)]
struct CacheEntry {
    /// `None` remembers a negative lookup.
    document: Option<Document>,
    stored_at: Instant,
    /// Insertion order, breaks ties between entries stored at the same instant.
    sequence: u64,
    access_count: u64,
}

/// A backend wrapper that caches document reads.
///
/// # Example
///
/// ```rust
/// use notas_storage::backend::StorageBackend;
/// use notas_storage::cache::{CacheBackend, CacheConfig};
/// use notas_storage::document::Document;
/// use notas_storage::memory::InMemoryBackend;
///
/// # tokio_test::block_on(async {
/// let cached = CacheBackend::new(InMemoryBackend::new(), CacheConfig::default());
/// cached.write_document(&Document::new("a", "Alpha")).await.unwrap();
/// cached.read_document("a").await.unwrap();
///
/// let stats = cached.stats().await;
/// assert_eq!((stats.hits, stats.misses), (1, 0));
/// # });
/// ```
pub struct CacheBackend<B: StorageBackend> {
    inner: B,
    max_entries: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    next_sequence: AtomicU64,
    /// Bumped under the entries lock by every write and delete.
    mutations: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<B: StorageBackend> CacheBackend<B> {
    /// Wrap `inner` with a cache sized by `config`.
    pub fn new(inner: B, config: CacheConfig) -> Self {
        Self {
            inner,
            max_entries: config.max_entries,
            ttl: config.ttl(),
            entries: Mutex::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            mutations: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return a reference to the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.entries.lock().await.len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Reset hit and miss counters to zero.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Drop every cached entry. The backend is untouched.
    pub async fn clear_cache(&self) {
        self.entries.lock().await.clear();
    }

    /// Drop the cached entry for `id`, if any.
    pub async fn invalidate(&self, id: &str) {
        let mut entries = self.entries.lock().await;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        entries.remove(id);
    }

    /// How many times the cached entry for `id` has been served.
    pub async fn access_count(&self, id: &str) -> Option<u64> {
        self.entries.lock().await.get(id).map(|e| e.access_count)
    }

    /// Cache a freshly written document.
    async fn store_written(&self, id: &str, document: Document) {
        let mut entries = self.entries.lock().await;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.insert(&mut entries, id, Some(document));
    }

    /// Cache a backend read result, unless a write or delete landed since
    /// `seen` was taken; the read may then predate it.
    async fn store_read(&self, id: &str, document: Option<Document>, seen: u64) {
        let mut entries = self.entries.lock().await;
        if self.mutations.load(Ordering::SeqCst) != seen {
            trace!(id, "skipping cache fill racing a mutation");
            return;
        }
        self.insert(&mut entries, id, document);
    }

    fn insert(&self, entries: &mut HashMap<String, CacheEntry>, id: &str, document: Option<Document>) {
        if self.max_entries == 0 {
            return;
        }
        if !entries.contains_key(id) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| (e.stored_at, e.sequence))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                trace!(id = %oldest, "evicting cache entry");
                entries.remove(&oldest);
            }
        }
        entries.insert(
            id.to_string(),
            CacheEntry {
                document,
                stored_at: Instant::now(),
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
                access_count: 0,
            },
        );
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for CacheBackend<B> {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        self.inner.initialize().await
    }

    async fn read_document(&self, id: &str) -> Result<Option<Document>, StorageError> {
        {
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get_mut(id) {
                if entry.stored_at.elapsed() <= self.ttl {
                    entry.access_count += 1;
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.document.clone());
                }
                trace!(id, "cache entry expired");
                entries.remove(id);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let seen = self.mutations.load(Ordering::SeqCst);
        let document = self.inner.read_document(id).await?;
        self.store_read(id, document.clone(), seen).await;
        Ok(document)
    }

    async fn write_document(&self, doc: &Document) -> Result<(), StorageError> {
        self.inner.write_document(doc).await?;
        self.store_written(&doc.id, doc.clone()).await;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), StorageError> {
        self.inner.delete_document(id).await?;
        self.invalidate(id).await;
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StorageError> {
        self.inner.list_documents().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    fn config(max_entries: usize, ttl_seconds: u64) -> CacheConfig {
        CacheConfig {
            enabled: true,
            max_entries,
            ttl_seconds,
        }
    }

    #[tokio::test]
    async fn test_write_through_then_hit() {
        let cache = CacheBackend::new(InMemoryBackend::new(), CacheConfig::default());
        let doc = Document::new("a", "Alpha");

        cache.write_document(&doc).await.unwrap();
        assert_eq!(cache.read_document("a").await.unwrap(), Some(doc));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 1);
        assert_eq!(cache.access_count("a").await, Some(1));
    }

    #[tokio::test]
    async fn test_miss_then_hit_and_hit_rate() {
        let inner = InMemoryBackend::new();
        inner.write_document(&Document::new("a", "Alpha")).await.unwrap();
        let cache = CacheBackend::new(inner, CacheConfig::default());

        assert_eq!(cache.stats().await.hit_rate, 0.0);
        cache.read_document("a").await.unwrap();
        cache.read_document("a").await.unwrap();

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);

        cache.reset_stats();
        assert_eq!(cache.stats().await.hits, 0);
    }

    #[tokio::test]
    async fn test_negative_lookups_are_cached() {
        let inner = InMemoryBackend::new();
        let cache = CacheBackend::new(inner.clone(), CacheConfig::default());

        assert_eq!(cache.read_document("ghost").await.unwrap(), None);
        // Written behind the cache's back: the cached miss still answers.
        inner.write_document(&Document::new("ghost", "Boo")).await.unwrap();
        assert_eq!(cache.read_document("ghost").await.unwrap(), None);
        assert_eq!(cache.stats().await.hits, 1);

        cache.invalidate("ghost").await;
        assert!(cache.read_document("ghost").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_drops_oldest_entry() {
        let cache = CacheBackend::new(InMemoryBackend::new(), config(2, 300));

        for id in ["a", "b", "c"] {
            cache.write_document(&Document::new(id, id)).await.unwrap();
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert_eq!(cache.stats().await.size, 2);

        // "a" was evicted, so reading it is a miss; "c" is still cached.
        cache.read_document("c").await.unwrap();
        cache.read_document("a").await.unwrap();
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.size, 2);
    }

    #[tokio::test]
    async fn test_rewriting_existing_key_does_not_evict() {
        let cache = CacheBackend::new(InMemoryBackend::new(), config(2, 300));
        cache.write_document(&Document::new("a", "A")).await.unwrap();
        cache.write_document(&Document::new("b", "B")).await.unwrap();
        cache.write_document(&Document::new("a", "A2")).await.unwrap();

        assert_eq!(cache.stats().await.size, 2);
        cache.read_document("b").await.unwrap();
        assert_eq!(cache.stats().await.misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let inner = InMemoryBackend::new();
        let cache = CacheBackend::new(inner.clone(), config(10, 60));

        cache.write_document(&Document::new("a", "Old")).await.unwrap();
        inner.write_document(&Document::new("a", "New")).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.read_document("a").await.unwrap().unwrap().title, "Old");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.read_document("a").await.unwrap().unwrap().title, "New");

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn test_delete_drops_entry() {
        let cache = CacheBackend::new(InMemoryBackend::new(), CacheConfig::default());
        cache.write_document(&Document::new("a", "A")).await.unwrap();
        cache.delete_document("a").await.unwrap();

        assert_eq!(cache.stats().await.size, 0);
        assert_eq!(cache.read_document("a").await.unwrap(), None);
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_list_bypasses_cache() {
        let inner = InMemoryBackend::new();
        let cache = CacheBackend::new(inner.clone(), CacheConfig::default());
        cache.write_document(&Document::new("a", "A")).await.unwrap();
        inner.write_document(&Document::new("b", "B")).await.unwrap();

        assert_eq!(cache.list_documents().await.unwrap().len(), 2);
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[tokio::test]
    async fn test_clear_cache_keeps_backend() {
        let cache = CacheBackend::new(InMemoryBackend::new(), CacheConfig::default());
        cache.write_document(&Document::new("a", "A")).await.unwrap();
        cache.clear_cache().await;

        assert_eq!(cache.stats().await.size, 0);
        assert!(cache.read_document("a").await.unwrap().is_some());
        assert_eq!(cache.inner().len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        let cache = CacheBackend::new(InMemoryBackend::new(), CacheConfig::default());
        assert!(cache.write_document(&Document::new("", "bad")).await.is_err());
        assert_eq!(cache.stats().await.size, 0);
    }

    /// Reads from the wrapped backend, then stalls before returning.
    struct SlowRead(InMemoryBackend);

    #[async_trait]
    impl StorageBackend for SlowRead {
        fn kind(&self) -> BackendKind {
            self.0.kind()
        }
        fn name(&self) -> &str {
            "slow-read"
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn initialize(&self) -> Result<(), StorageError> {
            Ok(())
        }
        async fn read_document(&self, id: &str) -> Result<Option<Document>, StorageError> {
            let doc = self.0.read_document(id).await?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(doc)
        }
        async fn write_document(&self, doc: &Document) -> Result<(), StorageError> {
            self.0.write_document(doc).await
        }
        async fn delete_document(&self, id: &str) -> Result<(), StorageError> {
            self.0.delete_document(id).await
        }
        async fn list_documents(&self) -> Result<Vec<Document>, StorageError> {
            self.0.list_documents().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_racing_write_does_not_cache_stale_document() {
        let inner = InMemoryBackend::new();
        inner.write_document(&Document::new("a", "Old")).await.unwrap();
        let cache = std::sync::Arc::new(CacheBackend::new(SlowRead(inner), CacheConfig::default()));

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.read_document("a").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.write_document(&Document::new("a", "New")).await.unwrap();
        reader.await.unwrap().unwrap();

        assert_eq!(cache.read_document("a").await.unwrap().unwrap().title, "New");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_racing_delete_does_not_resurrect_document() {
        let inner = InMemoryBackend::new();
        inner.write_document(&Document::new("a", "Old")).await.unwrap();
        let cache = std::sync::Arc::new(CacheBackend::new(SlowRead(inner), CacheConfig::default()));

        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.read_document("a").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.delete_document("a").await.unwrap();
        reader.await.unwrap().unwrap();

        assert_eq!(cache.read_document("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delegates_identity() {
        let cache = CacheBackend::new(InMemoryBackend::new(), CacheConfig::default());
        assert_eq!(cache.kind(), BackendKind::Memory);
        assert_eq!(cache.name(), "in-memory");
        assert!(cache.is_available().await);
    }
}
