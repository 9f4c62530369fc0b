// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remembers the document directory chosen for the file-system backend, so a
// later session can resume without asking for it again. The handle is a
// small JSON file; permission on the directory itself is re-verified by the
// backend on every resume.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;

/// A persisted reference to a document directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryHandle {
    /// The chosen directory.
    pub directory: PathBuf,
    /// When the directory was last confirmed.
    pub saved_at: DateTime<Utc>,
}

/// JSON-file store for a single [`DirectoryHandle`].
#[derive(Debug, Clone)]
pub struct HandleStore {
    path: PathBuf,
}

impl HandleStore {
    /// Create a store persisting to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the handle file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the remembered handle. A missing or unreadable file yields
    /// `None`; only the latter is logged.
    pub async fn load(&self) -> Option<DirectoryHandle> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read directory handle");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt directory handle");
                None
            }
        }
    }

    /// Remember `directory`.
    pub async fn save(&self, directory: &Path) -> Result<(), StorageError> {
        let handle = DirectoryHandle {
            directory: directory.to_path_buf(),
            saved_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&handle)?).await?;
        debug!(directory = %directory.display(), "saved directory handle");
        Ok(())
    }

    /// Forget the remembered directory.
    pub async fn clear(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
