// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory document backend for notas.
//
// Uses a `BTreeMap` wrapped in a tokio `RwLock`, so listings come back in id
// order. Always available and never persisted: intended for tests, previews
// and as the last-resort fallback of the storage service.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{BackendKind, StorageBackend};
use crate::document::Document;
use crate::error::StorageError;

/// An in-memory backend backed by a sorted `BTreeMap` of id to document.
///
/// All data lives in process memory and is lost on drop. Clones share the
/// same map.
///
/// # Example
///
/// ```rust
/// use notas_storage::backend::StorageBackend;
/// use notas_storage::document::Document;
/// use notas_storage::memory::InMemoryBackend;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryBackend::new();
/// store.write_document(&Document::new("a", "Alpha")).await.unwrap();
/// let doc = store.read_document("a").await.unwrap().unwrap();
/// assert_eq!(doc.title, "Alpha");
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    documents: Arc<RwLock<BTreeMap<String, Document>>>,
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of documents currently stored.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Return true if the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn name(&self) -> &str {
        "in-memory"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn read_document(&self, id: &str) -> Result<Option<Document>, StorageError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn write_document(&self, doc: &Document) -> Result<(), StorageError> {
        doc.validate()?;
        self.documents
            .write()
            .await
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), StorageError> {
        self.documents.write().await.remove(id);
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StorageError> {
        Ok(self.documents.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_basic_crud() {
        let backend = InMemoryBackend::new();

        assert!(backend.is_empty().await);
        assert_eq!(backend.read_document("a").await.unwrap(), None);

        let doc = Document::new("a", "Alpha")
            .with_content(json!({"text": "hello"}))
            .with_timestamps(Utc::now(), Utc::now());
        backend.write_document(&doc).await.unwrap();
        assert_eq!(backend.read_document("a").await.unwrap(), Some(doc.clone()));

        // Overwrite in place.
        let renamed = Document { title: "Alpha 2".into(), ..doc };
        backend.write_document(&renamed).await.unwrap();
        assert_eq!(backend.len().await, 1);
        assert_eq!(
            backend.read_document("a").await.unwrap().unwrap().title,
            "Alpha 2"
        );

        backend.delete_document("a").await.unwrap();
        assert_eq!(backend.read_document("a").await.unwrap(), None);

        // Deleting again is fine.
        backend.delete_document("a").await.unwrap();
        assert!(backend.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_rejects_invalid_document() {
        let backend = InMemoryBackend::new();
        let err = backend
            .write_document(&Document::new("", "Nameless"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_id() {
        let backend = InMemoryBackend::new();
        for id in ["c", "a", "b"] {
            backend.write_document(&Document::new(id, id)).await.unwrap();
        }
        let ids: Vec<String> = backend
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let backend = InMemoryBackend::new();
        let clone = backend.clone();

        backend.write_document(&Document::new("shared", "S")).await.unwrap();
        assert!(clone.read_document("shared").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_always_available() {
        let backend = InMemoryBackend::new();
        assert!(backend.is_available().await);
        backend.initialize().await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Memory);
        assert_eq!(backend.name(), "in-memory");
    }
}
