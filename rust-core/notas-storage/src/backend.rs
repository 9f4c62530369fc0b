// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core storage backend trait for notas.
//
// Defines the `StorageBackend` trait that every document store satisfies:
// a capability probe, an explicit setup step, and document CRUD plus a full
// listing. Backends are expected to be thread-safe (`Send + Sync`) and fully
// asynchronous so that callers can swap them without changing logic.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::StorageError;

/// Type tag of a concrete backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// One JSON file per document in a chosen directory.
    #[serde(rename = "filesystem")]
    FileSystem,
    /// The indexed local database.
    IndexedLocal,
    /// Process memory only.
    Memory,
}

impl BackendKind {
    /// Selection order used when no backend is requested explicitly.
    pub const DEFAULT_PRIORITY: [BackendKind; 3] = [
        BackendKind::FileSystem,
        BackendKind::IndexedLocal,
        BackendKind::Memory,
    ];

    /// The stable string tag.
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::FileSystem => "filesystem",
            BackendKind::IndexedLocal => "indexed-local",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filesystem" | "fs" | "file-system" => Ok(BackendKind::FileSystem),
            "indexed-local" | "local" | "localdb" | "redb" => Ok(BackendKind::IndexedLocal),
            "memory" | "in-memory" => Ok(BackendKind::Memory),
            other => Err(StorageError::NotConfigured(format!(
                "unknown backend kind '{other}'"
            ))),
        }
    }
}

/// A pluggable document store.
///
/// Read misses are `Ok(None)`, never errors. Writes are upserts keyed by
/// [`Document::id`] and must reject invalid documents with
/// [`StorageError::Validation`]. Deletes are idempotent.
///
/// Implementations must be safe to share across threads and tokio tasks.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// The type tag of this backend.
    fn kind(&self) -> BackendKind;

    /// A human-readable name for this backend, used in logging.
    fn name(&self) -> &str;

    /// Cheap capability probe. Never fails.
    async fn is_available(&self) -> bool;

    /// Perform any setup needed before use.
    ///
    /// Fails with [`StorageError::Initialization`] if setup cannot complete.
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Retrieve the document with the given id, or `None` if absent.
    async fn read_document(&self, id: &str) -> Result<Option<Document>, StorageError>;

    /// Store `doc`, overwriting any previous document with the same id.
    async fn write_document(&self, doc: &Document) -> Result<(), StorageError>;

    /// Remove the document with the given id. Absent ids are not an error.
    async fn delete_document(&self, id: &str) -> Result<(), StorageError>;

    /// Return every persisted document, skipping entries that cannot be
    /// decoded.
    async fn list_documents(&self) -> Result<Vec<Document>, StorageError>;
}

#[async_trait]
impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn is_available(&self) -> bool {
        (**self).is_available().await
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        (**self).initialize().await
    }

    async fn read_document(&self, id: &str) -> Result<Option<Document>, StorageError> {
        (**self).read_document(id).await
    }

    async fn write_document(&self, doc: &Document) -> Result<(), StorageError> {
        (**self).write_document(doc).await
    }

    async fn delete_document(&self, id: &str) -> Result<(), StorageError> {
        (**self).delete_document(id).await
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StorageError> {
        (**self).list_documents().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parses_aliases() {
        assert_eq!("filesystem".parse::<BackendKind>().unwrap(), BackendKind::FileSystem);
        assert_eq!(" FS ".parse::<BackendKind>().unwrap(), BackendKind::FileSystem);
        assert_eq!("redb".parse::<BackendKind>().unwrap(), BackendKind::IndexedLocal);
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("floppy".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_kind_serde_tags_match_display() {
        for kind in BackendKind::DEFAULT_PRIORITY {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
            let back: BackendKind = serde_json::from_value(json).unwrap();
            assert_eq!(back, kind);
        }
    }
}
