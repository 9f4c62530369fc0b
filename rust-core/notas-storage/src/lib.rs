// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// notas storage core
//
// Pluggable document storage for the notas notebook application. The
// `StorageBackend` trait is the contract every store satisfies; the storage
// service picks one working backend at startup, optionally behind a cache,
// and the watcher and migration engine operate directly on backend instances.
//
// # Modules
//
// - [`backend`] -- The `StorageBackend` trait and `BackendKind` tags.
// - [`document`] -- The `Document` model and the on-disk envelope.
// - [`error`] -- The `StorageError` enum covering all failure modes.
// - [`memory`] -- An in-memory `BTreeMap` backend.
// - [`filesystem`] -- One JSON file per document in a chosen directory.
// - [`local_db`] -- The indexed local database backend (redb).
// - [`handle_store`] -- Remembers the chosen document directory.
// - [`cache`] -- A caching wrapper with bounded size and TTL.
// - [`service`] -- Backend selection and the storage facade.
// - [`watcher`] -- Polling change detection over a document directory.
// - [`migration`] -- Batched migration between backends with rollback.
// - [`config`] -- Configuration with file and environment loading.
//
// # Example
//
// ```rust
// use notas_storage::backend::StorageBackend;
// use notas_storage::cache::{CacheBackend, CacheConfig};
// use notas_storage::document::Document;
// use notas_storage::memory::InMemoryBackend;
//
// # tokio_test::block_on(async {
// let store = CacheBackend::new(InMemoryBackend::new(), CacheConfig::default());
// store.write_document(&Document::new("n1", "Shopping list")).await.unwrap();
//
// let doc = store.read_document("n1").await.unwrap().unwrap();
// assert_eq!(doc.title, "Shopping list");
// # });
// ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod filesystem;
pub mod handle_store;
pub mod memory;
pub mod migration;
pub mod service;
pub mod watcher;

// The indexed local database pulls in redb; feature-gated to keep it optional.
#[cfg(feature = "redb-backend")]
pub mod local_db;

// Re-export the most commonly used types at the crate root for convenience.
pub use backend::{BackendKind, StorageBackend};
pub use cache::{CacheBackend, CacheConfig, CacheStats};
pub use config::{StorageConfig, WatcherConfig};
pub use document::Document;
pub use error::StorageError;
pub use filesystem::FileSystemBackend;
pub use memory::InMemoryBackend;
pub use migration::{
    MigrationConfig, MigrationEngine, MigrationError, MigrationPhase, MigrationProgress,
    MigrationReport, VerificationReport,
};
pub use service::{BackendRegistry, StorageService};
pub use watcher::{FileChange, FileWatcher, WatchHandler, WatchState};

#[cfg(feature = "redb-backend")]
pub use local_db::LocalDbBackend;
