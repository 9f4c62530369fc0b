// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Directory-backed document backend for notas.
//
// Every document lives in its own JSON file inside a user-chosen directory.
//
// # Layout
//
// - File name: the sanitized document id plus `.json`. Files with the
//   legacy `.notas` extension are still read and listed.
// - File body: an export envelope `{ version, exportedAt, document }` on
//   write; bare document objects are accepted on read.
// - Writes go to a dot-prefixed temp file that is renamed over the target,
//   so a document file is never partially replaced.
//
// The directory comes from configuration or, failing that, from the
// [`HandleStore`] that remembers the last directory used.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{BackendKind, StorageBackend};
use crate::document::{Document, DocumentEnvelope, StoredDocument};
use crate::error::StorageError;
use crate::handle_store::HandleStore;
use crate::watcher::{DirectorySnapshot, FileSnapshot, SnapshotSource};

/// Extension used for newly written documents.
pub const PRIMARY_EXTENSION: &str = "json";

/// Extensions accepted on read, in lookup order.
pub const RECOGNIZED_EXTENSIONS: [&str; 2] = [PRIMARY_EXTENSION, "notas"];

const PERMISSION_PROBE: &str = ".notas-permission-check";

/// Map a document id to a file stem: every character other than ASCII
/// alphanumerics, `-` and `_` becomes `_`.
pub fn sanitize_file_name(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The id derived from a recognized document file name, or `None` for
/// anything else (other extensions, hidden and temp files).
pub fn document_id_from_file_name(file_name: &str) -> Option<&str> {
    if file_name.starts_with('.') {
        return None;
    }
    RECOGNIZED_EXTENSIONS.iter().find_map(|ext| {
        file_name
            .strip_suffix(ext)
            .and_then(|rest| rest.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())
    })
}

fn extension_rank(file_name: &str) -> usize {
    RECOGNIZED_EXTENSIONS
        .iter()
        .position(|ext| file_name.ends_with(&format!(".{ext}")))
        .unwrap_or(RECOGNIZED_EXTENSIONS.len())
}

/// A backend storing one JSON file per document.
///
/// # Example
///
/// ```rust,no_run
/// use notas_storage::backend::StorageBackend;
/// use notas_storage::document::Document;
/// use notas_storage::filesystem::FileSystemBackend;
///
/// # tokio_test::block_on(async {
/// let store = FileSystemBackend::new("/tmp/notas-docs");
/// store.initialize().await.unwrap();
/// store.write_document(&Document::new("a", "Alpha")).await.unwrap();
/// // Persisted as /tmp/notas-docs/a.json
/// # });
/// ```
#[derive(Debug)]
pub struct FileSystemBackend {
    /// The active directory; set from configuration or on initialize.
    directory: RwLock<Option<PathBuf>>,
    /// Where the chosen directory is remembered between sessions.
    handle_store: Option<HandleStore>,
}

impl FileSystemBackend {
    /// Create a backend over `directory`.
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: RwLock::new(Some(directory.as_ref().to_path_buf())),
            handle_store: None,
        }
    }

    /// Create a backend that falls back to (and updates) the remembered
    /// directory in `handle_store` when `directory` is not given.
    pub fn with_handle_store(directory: Option<PathBuf>, handle_store: HandleStore) -> Self {
        Self {
            directory: RwLock::new(directory),
            handle_store: Some(handle_store),
        }
    }

    /// The directory currently in use, if one has been chosen.
    pub async fn directory(&self) -> Option<PathBuf> {
        self.directory.read().await.clone()
    }

    async fn require_directory(&self) -> Result<PathBuf, StorageError> {
        self.directory()
            .await
            .ok_or_else(|| StorageError::NotConfigured("no document directory chosen".to_string()))
    }

    async fn resolve_directory(&self) -> Option<PathBuf> {
        if let Some(dir) = self.directory().await {
            return Some(dir);
        }
        match &self.handle_store {
            Some(store) => store.load().await.map(|handle| handle.directory),
            None => None,
        }
    }

    /// Read and normalize one document file by name.
    pub async fn read_file(&self, file_name: &str) -> Result<Document, StorageError> {
        let dir = self.require_directory().await?;
        let bytes = tokio::fs::read(dir.join(file_name)).await?;
        Ok(StoredDocument::from_slice(&bytes)?.into_document())
    }

    async fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The id of the document stored at `path`, if the file exists and parses.
async fn stored_id(path: &Path) -> Option<String> {
    let bytes = tokio::fs::read(path).await.ok()?;
    StoredDocument::from_slice(&bytes)
        .ok()
        .map(|stored| stored.into_document().id)
}

/// Confirm read/write access to `dir`, creating it when missing.
async fn verify_permission(dir: &Path) -> Result<(), String> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(format!("{} is not a directory", dir.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| format!("cannot create {}: {e}", dir.display()))?;
        }
        Err(e) => return Err(format!("cannot access {}: {e}", dir.display())),
    }

    tokio::fs::read_dir(dir)
        .await
        .map_err(|e| format!("cannot read {}: {e}", dir.display()))?;

    let probe = dir.join(PERMISSION_PROBE);
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| format!("cannot write to {}: {e}", dir.display()))?;
    let _ = tokio::fs::remove_file(&probe).await;
    Ok(())
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::FileSystem
    }

    fn name(&self) -> &str {
        "filesystem"
    }

    async fn is_available(&self) -> bool {
        self.resolve_directory().await.is_some()
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        let dir = self.resolve_directory().await.ok_or_else(|| {
            StorageError::initialization(BackendKind::FileSystem, "no document directory chosen")
        })?;

        verify_permission(&dir)
            .await
            .map_err(|reason| StorageError::initialization(BackendKind::FileSystem, reason))?;

        if let Some(store) = &self.handle_store {
            if let Err(e) = store.save(&dir).await {
                warn!(error = %e, "could not remember document directory");
            }
        }

        info!(directory = %dir.display(), "file-system backend ready");
        *self.directory.write().await = Some(dir);
        Ok(())
    }

    async fn read_document(&self, id: &str) -> Result<Option<Document>, StorageError> {
        let dir = self.require_directory().await?;
        let stem = sanitize_file_name(id);

        for ext in RECOGNIZED_EXTENSIONS {
            let path = dir.join(format!("{stem}.{ext}"));
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let doc = match StoredDocument::from_slice(&bytes) {
                        Ok(stored) => stored.into_document(),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "unreadable document file");
                            return Ok(None);
                        }
                    };
                    // Distinct ids can sanitize to the same file name.
                    if doc.id != id {
                        debug!(id, stored = %doc.id, path = %path.display(), "file holds another document");
                        continue;
                    }
                    return Ok(Some(doc));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read document file");
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    async fn write_document(&self, doc: &Document) -> Result<(), StorageError> {
        doc.validate()?;
        let dir = self.require_directory().await?;
        let stem = sanitize_file_name(&doc.id);
        let file_name = format!("{stem}.{PRIMARY_EXTENSION}");
        let target = dir.join(&file_name);
        let temp = dir.join(format!(".{file_name}.tmp"));

        for ext in RECOGNIZED_EXTENSIONS {
            let existing = format!("{stem}.{ext}");
            if let Some(other) = stored_id(&dir.join(&existing)).await {
                if other != doc.id {
                    return Err(StorageError::Validation(format!(
                        "document '{}' maps to {existing}, which already holds document '{other}'",
                        doc.id
                    )));
                }
            }
        }

        let body = serde_json::to_vec_pretty(&DocumentEnvelope::wrap(doc.clone()))?;
        tokio::fs::write(&temp, &body).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        // A legacy copy would shadow nothing on read but would be listed twice.
        for ext in &RECOGNIZED_EXTENSIONS[1..] {
            Self::remove_if_exists(&dir.join(format!("{stem}.{ext}"))).await?;
        }

        debug!(id = %doc.id, path = %target.display(), "wrote document");
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), StorageError> {
        let dir = self.require_directory().await?;
        let stem = sanitize_file_name(id);
        for ext in RECOGNIZED_EXTENSIONS {
            let path = dir.join(format!("{stem}.{ext}"));
            match stored_id(&path).await {
                Some(other) if other != id => {
                    debug!(id, stored = %other, path = %path.display(), "not deleting another document's file");
                }
                _ => Self::remove_if_exists(&path).await?,
            }
        }
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StorageError> {
        let dir = self.require_directory().await?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = %dir.display(), error = %e, "failed to list document directory");
                return Ok(Vec::new());
            }
        };

        // id -> (extension rank, document); the primary extension wins.
        let mut found: BTreeMap<String, (usize, Document)> = BTreeMap::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(directory = %dir.display(), error = %e, "directory listing interrupted");
                    break;
                }
            };
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if document_id_from_file_name(&file_name).is_none() {
                continue;
            }

            let path = entry.path();
            let doc = match tokio::fs::read(&path).await {
                Ok(bytes) => match StoredDocument::from_slice(&bytes) {
                    Ok(stored) => stored.into_document(),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unparsable document file");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable document file");
                    continue;
                }
            };

            let rank = extension_rank(&file_name);
            match found.get(&doc.id) {
                Some((existing, _)) if *existing <= rank => {}
                _ => {
                    found.insert(doc.id.clone(), (rank, doc));
                }
            }
        }

        Ok(found.into_values().map(|(_, doc)| doc).collect())
    }
}

#[async_trait]
impl SnapshotSource for FileSystemBackend {
    async fn snapshot(&self) -> Result<DirectorySnapshot, StorageError> {
        let dir = self.require_directory().await?;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut snapshot = DirectorySnapshot::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = document_id_from_file_name(&file_name) else {
                continue;
            };
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                // Removed between listing and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            snapshot.insert(
                file_name.clone(),
                FileSnapshot {
                    id: id.to_string(),
                    file_name,
                    last_modified: meta.modified()?,
                    size: meta.len(),
                },
            );
        }
        Ok(snapshot)
    }

    async fn load(&self, file_name: &str) -> Result<Document, StorageError> {
        self.read_file(file_name).await
    }
}
