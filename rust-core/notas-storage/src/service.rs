// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage service: picks one working backend and fronts it.
//
// Candidate backends come from a `BackendRegistry` of factories. On first use
// (or an explicit `initialize`) the service walks the candidates in priority
// order, probing `is_available` then `initialize`, and keeps the first one
// that passes both. Concurrent callers await the same in-flight attempt and
// see its outcome; a failed attempt is forgotten once it settles so a later
// call can retry.

use std::fmt;
use std::sync::{Arc, OnceLock};

use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{BackendKind, StorageBackend};
use crate::cache::{CacheBackend, CacheConfig, CacheStats};
use crate::config::StorageConfig;
use crate::document::Document;
use crate::error::StorageError;
use crate::filesystem::FileSystemBackend;
use crate::handle_store::HandleStore;
use crate::memory::InMemoryBackend;

/// Builds a fresh backend instance.
pub type BackendFactory = Arc<dyn Fn() -> Arc<dyn StorageBackend> + Send + Sync>;

/// Ordered set of backend factories, one per [`BackendKind`].
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: Vec<(BackendKind, BackendFactory)>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `kind`, replacing any earlier registration.
    pub fn register<F>(&mut self, kind: BackendKind, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn StorageBackend> + Send + Sync + 'static,
    {
        self.factories.retain(|(k, _)| *k != kind);
        self.factories.push((kind, Arc::new(factory)));
        self
    }

    /// Kinds with a registered factory, in registration order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.factories.iter().map(|(k, _)| *k).collect()
    }

    /// Build a backend of `kind`, if one is registered.
    pub fn create(&self, kind: BackendKind) -> Option<Arc<dyn StorageBackend>> {
        self.factories
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, factory)| factory())
    }

    /// Registry for the backends `config` can describe.
    ///
    /// The file-system backend needs a documents directory or a handle store
    /// to resume from; the indexed local backend needs a database path. The
    /// in-memory backend is always registered.
    pub fn from_config(config: &StorageConfig) -> Self {
        let mut registry = Self::new();

        let documents_dir = config.documents_dir.clone();
        match config.handle_store_path.clone() {
            Some(store_path) => {
                registry.register(BackendKind::FileSystem, move || {
                    Arc::new(FileSystemBackend::with_handle_store(
                        documents_dir.clone(),
                        HandleStore::new(&store_path),
                    ))
                });
            }
            None => {
                if let Some(dir) = documents_dir {
                    registry.register(BackendKind::FileSystem, move || {
                        Arc::new(FileSystemBackend::new(&dir))
                    });
                }
            }
        }

        #[cfg(feature = "redb-backend")]
        if let Some(db_path) = config.local_db_path.clone() {
            registry.register(BackendKind::IndexedLocal, move || {
                Arc::new(crate::local_db::LocalDbBackend::new(&db_path))
            });
        }

        registry.register(BackendKind::Memory, || Arc::new(InMemoryBackend::new()));
        registry
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// The backend chosen by [`StorageService::initialize`].
struct ActiveBackend {
    kind: BackendKind,
    /// What operations go through: the cache when enabled, else the backend.
    backend: Arc<dyn StorageBackend>,
    cache: Option<Arc<CacheBackend<Arc<dyn StorageBackend>>>>,
}

/// Outcome of one selection attempt; the error lists every rejected candidate.
type Selection = Result<Arc<ActiveBackend>, Vec<String>>;

/// Facade presenting one document API over whichever backend works.
///
/// # Example
///
/// ```rust
/// use notas_storage::backend::BackendKind;
/// use notas_storage::config::StorageConfig;
/// use notas_storage::document::Document;
/// use notas_storage::service::StorageService;
///
/// # tokio_test::block_on(async {
/// let service = StorageService::from_config(StorageConfig::default());
/// service.write_document(&Document::new("a", "Alpha")).await.unwrap();
/// assert_eq!(service.backend_type().unwrap(), BackendKind::Memory);
/// # });
/// ```
pub struct StorageService {
    registry: BackendRegistry,
    config: StorageConfig,
    active: OnceLock<Arc<ActiveBackend>>,
    /// The selection attempt in flight, if any. Cleared once it settles.
    pending: Mutex<Option<Shared<BoxFuture<'static, Selection>>>>,
}

impl StorageService {
    /// Service choosing among `registry`'s backends, configured by `config`.
    pub fn new(registry: BackendRegistry, config: StorageConfig) -> Self {
        Self {
            registry,
            config,
            active: OnceLock::new(),
            pending: Mutex::new(None),
        }
    }

    /// Service over [`BackendRegistry::from_config`].
    pub fn from_config(config: StorageConfig) -> Self {
        Self::new(BackendRegistry::from_config(&config), config)
    }

    /// The configuration this service was built with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Select a backend. `hint` restricts the candidates to that one kind;
    /// otherwise the default priority order is used.
    ///
    /// Once a backend has been selected, later calls return it regardless of
    /// `hint`. Callers arriving while a selection is running share its
    /// outcome, success or failure, and their own `hint` is ignored. After a
    /// failed attempt has settled, the next call starts a fresh one.
    pub async fn initialize(&self, hint: Option<BackendKind>) -> Result<BackendKind, StorageError> {
        if let Some(active) = self.active.get() {
            return Ok(active.kind);
        }

        let attempt = {
            let mut pending = self.pending.lock().await;
            if let Some(active) = self.active.get() {
                return Ok(active.kind);
            }
            pending
                .get_or_insert_with(|| {
                    select(self.registry.clone(), self.config.cache.clone(), hint)
                        .boxed()
                        .shared()
                })
                .clone()
        };

        let outcome = attempt.await;

        {
            let mut pending = self.pending.lock().await;
            if let Ok(active) = &outcome {
                // Only one attempt ever succeeds, so this is the first set.
                let _ = self.active.set(active.clone());
            }
            if pending.as_ref().is_some_and(|p| p.peek().is_some()) {
                *pending = None;
            }
        }

        outcome
            .map(|active| active.kind)
            .map_err(StorageError::NoBackendAvailable)
    }

    async fn active(&self) -> Result<&ActiveBackend, StorageError> {
        if self.active.get().is_none() {
            self.initialize(self.config.preferred_backend).await?;
        }
        self.active
            .get()
            .map(Arc::as_ref)
            .ok_or(StorageError::NotInitialized)
    }

    /// Kind of the selected backend.
    pub fn backend_type(&self) -> Result<BackendKind, StorageError> {
        self.active
            .get()
            .map(|active| active.kind)
            .ok_or(StorageError::NotInitialized)
    }

    /// Cache statistics, when a cache wraps the selected backend.
    pub async fn cache_stats(&self) -> Option<CacheStats> {
        match self.active.get().and_then(|active| active.cache.as_ref()) {
            Some(cache) => Some(cache.stats().await),
            None => None,
        }
    }

    /// Read `id` from the selected backend, selecting one first if needed.
    pub async fn read_document(&self, id: &str) -> Result<Option<Document>, StorageError> {
        self.active().await?.backend.read_document(id).await
    }

    /// Write `doc` through the selected backend.
    pub async fn write_document(&self, doc: &Document) -> Result<(), StorageError> {
        self.active().await?.backend.write_document(doc).await
    }

    /// Delete `id`. Deleting an unknown id is not an error.
    pub async fn delete_document(&self, id: &str) -> Result<(), StorageError> {
        self.active().await?.backend.delete_document(id).await
    }

    /// Every document the selected backend holds.
    pub async fn list_documents(&self) -> Result<Vec<Document>, StorageError> {
        self.active().await?.backend.list_documents().await
    }

    /// Write `docs` concurrently. Not transactional: on error some documents
    /// may already be written.
    pub async fn write_many(&self, docs: &[Document]) -> Result<(), StorageError> {
        let backend = &self.active().await?.backend;
        try_join_all(docs.iter().map(|doc| backend.write_document(doc))).await?;
        Ok(())
    }

    /// Read `ids` concurrently, preserving order.
    pub async fn read_many<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<Vec<Option<Document>>, StorageError> {
        let backend = &self.active().await?.backend;
        try_join_all(ids.iter().map(|id| backend.read_document(id.as_ref()))).await
    }
}

async fn select(
    registry: BackendRegistry,
    cache: CacheConfig,
    hint: Option<BackendKind>,
) -> Selection {
    let candidates: Vec<BackendKind> = match hint {
        Some(kind) => vec![kind],
        None => BackendKind::DEFAULT_PRIORITY.to_vec(),
    };

    let mut attempts = Vec::new();
    for kind in candidates {
        let Some(backend) = registry.create(kind) else {
            debug!(backend = %kind, "backend not registered");
            attempts.push(format!("{kind}: not configured"));
            continue;
        };
        if !backend.is_available().await {
            debug!(backend = %kind, "backend unavailable");
            attempts.push(format!("{kind}: unavailable"));
            continue;
        }
        if let Err(e) = backend.initialize().await {
            warn!(backend = %kind, error = %e, "backend failed to initialize");
            attempts.push(format!("{kind}: {e}"));
            continue;
        }

        info!(backend = %kind, name = backend.name(), "storage backend selected");
        return Ok(Arc::new(activate(kind, backend, &cache)));
    }

    warn!(attempts = attempts.len(), "no storage backend available");
    Err(attempts)
}

fn activate(
    kind: BackendKind,
    backend: Arc<dyn StorageBackend>,
    cache: &CacheConfig,
) -> ActiveBackend {
    if !cache.enabled {
        return ActiveBackend {
            kind,
            backend,
            cache: None,
        };
    }
    let cache = Arc::new(CacheBackend::new(backend, cache.clone()));
    ActiveBackend {
        kind,
        backend: cache.clone(),
        cache: Some(cache),
    }
}

impl fmt::Debug for StorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageService")
            .field("registry", &self.registry)
            .field("active", &self.active.get().map(|a| a.kind))
            .finish()
    }
}
