// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Indexed local database backend for notas.
//
// Adapts the legacy local document database to the backend contract. Uses
// redb (pure Rust, B-tree, ACID, single-file database): one `documents` table
// maps each document id to its JSON encoding.
//
// # Design
//
// - The database file is opened lazily on `initialize` or first use.
// - Read transactions for reads and listings, write transactions for
//   upserts and deletes (serialised by redb internally).
// - redb calls are blocking, so every operation runs on `spawn_blocking`.
// - Read paths log unexpected failures and degrade to `None`/skipping rows;
//   write paths propagate them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::backend::{BackendKind, StorageBackend};
use crate::document::Document;
use crate::error::StorageError;

/// Table definition for documents: id -> JSON bytes.
const DOCUMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// A persistent document backend powered by redb.
///
/// # Example
///
/// ```rust,no_run
/// use notas_storage::backend::StorageBackend;
/// use notas_storage::document::Document;
/// use notas_storage::local_db::LocalDbBackend;
///
/// # tokio_test::block_on(async {
/// let store = LocalDbBackend::new("/tmp/notas-test.redb");
/// store.initialize().await.unwrap();
/// store.write_document(&Document::new("a", "Alpha")).await.unwrap();
/// assert!(store.read_document("a").await.unwrap().is_some());
/// # });
/// ```
pub struct LocalDbBackend {
    /// Path to the database file.
    path: PathBuf,
    /// The opened database, set on first successful open.
    db: OnceCell<Arc<Database>>,
}

impl LocalDbBackend {
    /// Create a backend for the database file at `path`. Nothing is opened
    /// until [`StorageBackend::initialize`] or the first operation.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            db: OnceCell::new(),
        }
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (creating if needed) the database and its documents table.
    async fn database(&self) -> Result<Arc<Database>, StorageError> {
        let db = self
            .db
            .get_or_try_init(|| {
                let path = self.path.clone();
                async move {
                    tokio::task::spawn_blocking(move || open_database(&path))
                        .await
                        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
                }
            })
            .await?;
        Ok(Arc::clone(db))
    }
}

fn open_database(path: &Path) -> Result<Arc<Database>, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Database::create(path).map_err(|e| {
        StorageError::BackendUnavailable(format!("failed to open redb at {}: {e}", path.display()))
    })?;

    // Create the table up front so read transactions always find it.
    let txn = db
        .begin_write()
        .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
    txn.open_table(DOCUMENTS_TABLE)
        .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
    txn.commit()
        .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;

    debug!(path = %path.display(), "opened local document database");
    Ok(Arc::new(db))
}

fn decode(id: &str, bytes: &[u8]) -> Option<Document> {
    match serde_json::from_slice::<Document>(bytes) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(id, error = %e, "skipping undecodable document row");
            None
        }
    }
}

impl std::fmt::Debug for LocalDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDbBackend")
            .field("path", &self.path)
            .field("open", &self.db.initialized())
            .finish()
    }
}

#[async_trait]
impl StorageBackend for LocalDbBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::IndexedLocal
    }

    fn name(&self) -> &str {
        "redb"
    }

    async fn is_available(&self) -> bool {
        !self.path.as_os_str().is_empty() && !self.path.is_dir()
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        self.database()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::initialization(BackendKind::IndexedLocal, e.to_string()))
    }

    async fn read_document(&self, id: &str) -> Result<Option<Document>, StorageError> {
        let db = match self.database().await {
            Ok(db) => db,
            Err(e) => {
                warn!(id, error = %e, "local database unavailable for read");
                return Ok(None);
            }
        };
        let key = id.to_string();

        let result = tokio::task::spawn_blocking(move || -> Result<Option<Document>, StorageError> {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
            let table = match txn.open_table(DOCUMENTS_TABLE) {
                Ok(t) => t,
                Err(_) => return Ok(None),
            };
            match table.get(key.as_str()) {
                Ok(Some(value)) => Ok(decode(&key, value.value())),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::CorruptedData(format!("get: {e}"))),
            }
        })
        .await
        .unwrap_or_else(|e| Err(StorageError::BackendUnavailable(format!("task join: {e}"))));

        match result {
            Ok(doc) => Ok(doc),
            Err(e) => {
                warn!(id, error = %e, "local database read failed");
                Ok(None)
            }
        }
    }

    async fn write_document(&self, doc: &Document) -> Result<(), StorageError> {
        doc.validate()?;
        let db = self.database().await?;
        let key = doc.id.clone();
        let value = serde_json::to_vec(doc)?;

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(DOCUMENTS_TABLE)
                    .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("insert: {e}")))?;
            }
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    async fn delete_document(&self, id: &str) -> Result<(), StorageError> {
        let db = self.database().await?;
        let key = id.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(DOCUMENTS_TABLE)
                    .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
                table
                    .remove(key.as_str())
                    .map_err(|e| StorageError::CorruptedData(format!("remove: {e}")))?;
            }
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StorageError> {
        let db = match self.database().await {
            Ok(db) => db,
            Err(e) => {
                warn!(error = %e, "local database unavailable for listing");
                return Ok(Vec::new());
            }
        };

        let result = tokio::task::spawn_blocking(move || -> Result<Vec<Document>, StorageError> {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
            let table = match txn.open_table(DOCUMENTS_TABLE) {
                Ok(t) => t,
                Err(_) => return Ok(Vec::new()),
            };

            let iter = table
                .iter()
                .map_err(|e| StorageError::CorruptedData(format!("iterate: {e}")))?;

            let mut documents = Vec::new();
            for entry in iter {
                match entry {
                    Ok((key, value)) => {
                        if let Some(doc) = decode(key.value(), value.value()) {
                            documents.push(doc);
                        }
                    }
                    Err(e) => warn!(error = %e, "skipping unreadable document row"),
                }
            }
            Ok(documents)
        })
        .await
        .unwrap_or_else(|e| Err(StorageError::BackendUnavailable(format!("task join: {e}"))));

        match result {
            Ok(documents) => Ok(documents),
            Err(e) => {
                warn!(error = %e, "local database listing failed");
                Ok(Vec::new())
            }
        }
    }
}
