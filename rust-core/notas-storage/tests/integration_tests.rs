// SPDX-License-Identifier: PMPL-1.0-or-later
//! Integration tests for notas storage
//!
//! End-to-end flows across the storage service, the directory-backed store,
//! the local database, the migration engine and the file watcher.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::tempdir;

use notas_storage::watcher::SnapshotSource;
use notas_storage::{
    BackendKind, Document, FileChange, FileSystemBackend, FileWatcher, InMemoryBackend,
    MigrationConfig, MigrationEngine, MigrationPhase, StorageBackend, StorageConfig,
    StorageService, WatchHandler, WatchState,
};

fn sample(id: &str) -> Document {
    let created = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
    let updated = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
    Document::new(id, format!("Notebook {id}"))
        .with_content(json!({ "cells": [{ "type": "markdown", "source": "# hi" }] }))
        .with_timestamps(created, updated)
        .with_field("tags", json!(["work", "draft"]))
}

#[tokio::test]
async fn test_service_end_to_end_on_directory() {
    let dir = tempdir().unwrap();
    let config = StorageConfig {
        documents_dir: Some(dir.path().join("notes")),
        ..StorageConfig::default()
    };
    let service = StorageService::from_config(config);

    let doc = sample("n1");
    service.write_document(&doc).await.unwrap();
    assert_eq!(service.backend_type().unwrap(), BackendKind::FileSystem);

    // A fresh backend over the same directory sees the document, including
    // timestamps and fields the core does not model.
    let reopened = FileSystemBackend::new(dir.path().join("notes"));
    let read = reopened.read_document("n1").await.unwrap().unwrap();
    assert_eq!(read, doc);
    assert_eq!(read.extra["tags"], json!(["work", "draft"]));

    service.delete_document("n1").await.unwrap();
    assert_eq!(service.read_document("n1").await.unwrap(), None);
    assert!(service.list_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_handle_store_resumes_directory() {
    let dir = tempdir().unwrap();
    let notes = dir.path().join("notes");
    let handle = dir.path().join("state").join("handle.json");

    let first = StorageService::from_config(StorageConfig {
        documents_dir: Some(notes.clone()),
        handle_store_path: Some(handle.clone()),
        ..StorageConfig::default()
    });
    first.write_document(&sample("kept")).await.unwrap();

    // No directory configured this time: the remembered one is used.
    let second = StorageService::from_config(StorageConfig {
        handle_store_path: Some(handle),
        ..StorageConfig::default()
    });
    assert_eq!(second.initialize(None).await.unwrap(), BackendKind::FileSystem);
    assert!(second.read_document("kept").await.unwrap().is_some());
}

#[tokio::test]
async fn test_memory_fallback_without_configuration() {
    let service = StorageService::from_config(StorageConfig::default());
    let docs: Vec<Document> = ["a", "b", "c"].iter().map(|id| sample(id)).collect();
    service.write_many(&docs).await.unwrap();

    assert_eq!(service.backend_type().unwrap(), BackendKind::Memory);
    let read = service.read_many(&["c", "a"]).await.unwrap();
    assert_eq!(read[0].as_ref().unwrap().id, "c");
    assert_eq!(read[1].as_ref().unwrap().id, "a");
}

#[cfg(feature = "redb-backend")]
#[tokio::test]
async fn test_migrate_directory_to_local_db() {
    use notas_storage::LocalDbBackend;

    let dir = tempdir().unwrap();
    let source = Arc::new(FileSystemBackend::new(dir.path().join("notes")));
    source.initialize().await.unwrap();
    for i in 0..12 {
        source.write_document(&sample(&format!("doc-{i}"))).await.unwrap();
    }

    let target = Arc::new(LocalDbBackend::new(dir.path().join("db").join("notas.redb")));
    target.initialize().await.unwrap();

    let engine = MigrationEngine::new(source.clone(), target.clone());
    assert!(engine.needs_migration().await.unwrap());

    let mut phases = Vec::new();
    let report = engine
        .migrate(
            &MigrationConfig {
                batch_size: 5,
                preserve_source: true,
            },
            |p| {
                if phases.last() != Some(&p.phase) {
                    phases.push(p.phase);
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(report.migrated, 12);
    assert_eq!(
        phases,
        vec![
            MigrationPhase::Preparing,
            MigrationPhase::Migrating,
            MigrationPhase::Complete
        ]
    );
    assert_eq!(target.read_document("doc-7").await.unwrap(), Some(sample("doc-7")));

    let verification = engine.verify().await.unwrap();
    assert!(verification.success);
    assert_eq!(verification.target_count, 12);

    assert_eq!(engine.rollback().await.unwrap(), 12);
    assert!(target.list_documents().await.unwrap().is_empty());
    assert_eq!(source.list_documents().await.unwrap().len(), 12);
}

#[tokio::test]
async fn test_migrate_memory_to_directory_and_back() {
    let dir = tempdir().unwrap();
    let memory = InMemoryBackend::new();
    memory.write_document(&sample("m1")).await.unwrap();
    memory.write_document(&sample("m2")).await.unwrap();

    let disk = Arc::new(FileSystemBackend::new(dir.path()));
    disk.initialize().await.unwrap();

    let forward = MigrationEngine::new(Arc::new(memory.clone()), disk.clone());
    forward.migrate(&MigrationConfig::default(), |_| {}).await.unwrap();
    assert!(dir.path().join("m1.json").exists());

    let restored = InMemoryBackend::new();
    let back = MigrationEngine::new(disk, Arc::new(restored.clone()));
    back.migrate(&MigrationConfig::default(), |_| {}).await.unwrap();
    assert_eq!(
        restored.list_documents().await.unwrap(),
        memory.list_documents().await.unwrap()
    );
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl WatchHandler for EventLog {
    fn on_file_added(&self, id: &str, _doc: Document) {
        self.events.lock().unwrap().push(format!("added:{id}"));
    }

    fn on_file_changed(&self, id: &str, doc: Document) {
        self.events.lock().unwrap().push(format!("changed:{id}:{}", doc.title));
    }

    fn on_file_deleted(&self, id: &str) {
        self.events.lock().unwrap().push(format!("deleted:{id}"));
    }
}

#[tokio::test]
async fn test_watcher_sees_backend_writes() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(FileSystemBackend::new(dir.path()));
    backend.initialize().await.unwrap();
    backend.write_document(&Document::new("old", "Old")).await.unwrap();

    let log = Arc::new(EventLog::default());
    let watcher = FileWatcher::with_interval(log.clone(), Duration::from_secs(3600));
    watcher.set_backend(backend.clone()).await.unwrap();
    watcher.start().await.unwrap();
    assert_eq!(watcher.state().await, WatchState::Watching);

    backend.write_document(&Document::new("new", "New")).await.unwrap();
    backend
        .write_document(&Document::new("old", "Old but longer now"))
        .await
        .unwrap();
    let changes = watcher.poll_once().await.unwrap();
    assert_eq!(changes.len(), 2);

    backend.delete_document("new").await.unwrap();
    let changes = watcher.poll_once().await.unwrap();
    assert!(matches!(changes.as_slice(), [FileChange::Deleted(f)] if f.id == "new"));

    // Nothing moved since the last poll.
    assert!(watcher.poll_once().await.unwrap().is_empty());

    watcher.stop().await;
    assert_eq!(watcher.state().await, WatchState::Stopped);
    assert!(watcher.poll_once().await.is_err());

    let events = log.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "added:new".to_string(),
            "changed:old:Old but longer now".to_string(),
            "deleted:new".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_snapshot_ignores_foreign_files() {
    let dir = tempdir().unwrap();
    let backend = FileSystemBackend::new(dir.path());
    backend.initialize().await.unwrap();
    backend.write_document(&Document::new("a", "A")).await.unwrap();
    std::fs::write(dir.path().join("notes.txt"), "plain text").unwrap();

    let snapshot = backend.snapshot().await.unwrap();
    assert_eq!(snapshot.keys().cloned().collect::<Vec<_>>(), vec!["a.json".to_string()]);
}
