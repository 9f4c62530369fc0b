// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Migration engine: moves every document from a source backend to a target
// backend in fixed-size batches.
//
// Per-document write failures are collected as `MigrationError`s and never
// abort a run; only a failure to list the source does. Writes are upserts, so
// re-running `migrate` retries whatever failed last time. The source is never
// modified.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::StorageBackend;
use crate::document::Document;
use crate::error::StorageError;

/// Phase name recorded on per-document write failures.
pub const MIGRATION_PHASE: &str = "migration";

/// Options for a single migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Documents written concurrently per batch. Zero is treated as one.
    pub batch_size: usize,
    /// Keep an in-memory copy of the source listing for the run.
    pub preserve_source: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            preserve_source: true,
        }
    }
}

/// Where a migration run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationPhase {
    /// Listing the source documents.
    Preparing,
    /// Copying batches to the target.
    Migrating,
    /// Every batch has been attempted.
    Complete,
    /// The source could not be listed; nothing was copied.
    Error,
}

/// A document that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationError {
    /// Id of the document that failed.
    pub id: String,
    /// The target backend's error, rendered.
    pub message: String,
    /// Stage the failure happened in.
    pub phase: String,
}

/// Snapshot passed to the progress callback after every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub phase: MigrationPhase,
    /// Documents processed so far, successful or not.
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    pub errors: Vec<MigrationError>,
}

/// Outcome of [`MigrationEngine::migrate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Successful writes to the target.
    pub migrated: usize,
    /// Documents found in the source.
    pub total: usize,
    pub errors: Vec<MigrationError>,
}

impl MigrationReport {
    /// True when every source document reached the target.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.migrated == self.total
    }
}

/// Outcome of [`MigrationEngine::verify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub success: bool,
    pub source_count: usize,
    pub target_count: usize,
    pub error_count: usize,
    pub errors: Vec<MigrationError>,
}

#[derive(Debug, Default)]
struct RunState {
    errors: Vec<MigrationError>,
    backup: Option<Vec<Document>>,
}

/// Moves documents from `source` to `target`.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use notas_storage::backend::StorageBackend;
/// use notas_storage::document::Document;
/// use notas_storage::memory::InMemoryBackend;
/// use notas_storage::migration::{MigrationConfig, MigrationEngine};
///
/// # tokio_test::block_on(async {
/// let source = InMemoryBackend::new();
/// source.write_document(&Document::new("a", "Alpha")).await.unwrap();
///
/// let engine = MigrationEngine::new(Arc::new(source), Arc::new(InMemoryBackend::new()));
/// assert!(engine.needs_migration().await.unwrap());
///
/// let report = engine.migrate(&MigrationConfig::default(), |_| {}).await.unwrap();
/// assert_eq!(report.migrated, 1);
/// assert!(engine.verify().await.unwrap().success);
/// # });
/// ```
pub struct MigrationEngine {
    source: Arc<dyn StorageBackend>,
    target: Arc<dyn StorageBackend>,
    state: Mutex<RunState>,
}

impl MigrationEngine {
    /// Engine copying from `source` into `target`.
    pub fn new(source: Arc<dyn StorageBackend>, target: Arc<dyn StorageBackend>) -> Self {
        Self {
            source,
            target,
            state: Mutex::new(RunState::default()),
        }
    }

    /// Backend documents are read from.
    pub fn source(&self) -> &Arc<dyn StorageBackend> {
        &self.source
    }

    /// Backend documents are written to.
    pub fn target(&self) -> &Arc<dyn StorageBackend> {
        &self.target
    }

    /// True iff the source holds at least one document and the target none.
    ///
    /// This does not detect a target that is only partially populated.
    pub async fn needs_migration(&self) -> Result<bool, StorageError> {
        let source = self.source.list_documents().await?;
        if source.is_empty() {
            return Ok(false);
        }
        Ok(self.target.list_documents().await?.is_empty())
    }

    /// Copy every source document to the target.
    ///
    /// `progress` is called after each phase change and after each document.
    /// Fails only if the source cannot be listed, after reporting
    /// [`MigrationPhase::Error`].
    pub async fn migrate<F>(
        &self,
        config: &MigrationConfig,
        mut progress: F,
    ) -> Result<MigrationReport, StorageError>
    where
        F: FnMut(&MigrationProgress) + Send,
    {
        let mut state = self.state.lock().await;
        state.errors.clear();
        state.backup = None;

        let mut report = MigrationProgress {
            phase: MigrationPhase::Preparing,
            current: 0,
            total: 0,
            current_item: None,
            errors: Vec::new(),
        };
        progress(&report);

        let documents = match self.source.list_documents().await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "migration failed to list source");
                report.phase = MigrationPhase::Error;
                progress(&report);
                return Err(e);
            }
        };

        let total = documents.len();
        report.total = total;
        info!(
            source = self.source.name(),
            target = self.target.name(),
            total,
            "starting migration"
        );

        if total == 0 {
            report.phase = MigrationPhase::Complete;
            progress(&report);
            return Ok(MigrationReport {
                migrated: 0,
                total: 0,
                errors: Vec::new(),
            });
        }

        if config.preserve_source {
            state.backup = Some(documents.clone());
        }

        report.phase = MigrationPhase::Migrating;
        progress(&report);

        let mut migrated = 0;
        for batch in documents.chunks(config.batch_size.max(1)) {
            let results = join_all(batch.iter().map(|doc| self.target.write_document(doc))).await;
            for (doc, result) in batch.iter().zip(results) {
                report.current += 1;
                report.current_item = Some(doc.id.clone());
                match result {
                    Ok(()) => migrated += 1,
                    Err(e) => {
                        warn!(id = %doc.id, error = %e, "document failed to migrate");
                        report.errors.push(MigrationError {
                            id: doc.id.clone(),
                            message: e.to_string(),
                            phase: MIGRATION_PHASE.to_string(),
                        });
                    }
                }
                progress(&report);
            }
            debug!(done = report.current, total, "migration batch written");
        }

        report.phase = MigrationPhase::Complete;
        report.current_item = None;
        progress(&report);

        info!(migrated, total, errors = report.errors.len(), "migration complete");
        state.errors = report.errors.clone();
        Ok(MigrationReport {
            migrated,
            total,
            errors: report.errors,
        })
    }

    /// Recount both sides and compare, taking the last run's errors into
    /// account.
    pub async fn verify(&self) -> Result<VerificationReport, StorageError> {
        let source_count = self.source.list_documents().await?.len();
        let target_count = self.target.list_documents().await?.len();
        let errors = self.state.lock().await.errors.clone();

        let success = source_count == target_count && errors.is_empty();
        if !success {
            warn!(source_count, target_count, errors = errors.len(), "migration verification failed");
        }
        Ok(VerificationReport {
            success,
            source_count,
            target_count,
            error_count: errors.len(),
            errors,
        })
    }

    /// Delete every document currently in the target. Individual delete
    /// failures are logged and skipped. Returns the number deleted.
    pub async fn rollback(&self) -> Result<usize, StorageError> {
        let documents = self.target.list_documents().await?;
        let mut deleted = 0;
        for doc in &documents {
            match self.target.delete_document(&doc.id).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(id = %doc.id, error = %e, "rollback failed to delete document"),
            }
        }
        info!(target = self.target.name(), deleted, "migration rolled back");
        Ok(deleted)
    }

    /// The source listing captured by the last run, when it preserved one.
    pub async fn backup(&self) -> Option<Vec<Document>> {
        self.state.lock().await.backup.clone()
    }
}
