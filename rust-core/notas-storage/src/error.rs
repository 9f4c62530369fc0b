// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage error types for the notas document store.
//
// One enum covers backend setup, backend selection, document validation and
// the I/O, serialization and corruption failures of the concrete backends.
// Read misses are not errors: backends return `Ok(None)` for absent ids.

use thiserror::Error;

use crate::backend::BackendKind;

/// Errors that can occur when interacting with document storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A backend could not be set up (e.g. the document directory is not
    /// writable). The storage service reacts by trying the next candidate.
    #[error("failed to initialize {backend} backend: {reason}")]
    Initialization {
        /// The backend that failed.
        backend: BackendKind,
        /// Why setup could not complete.
        reason: String,
    },

    /// Every candidate backend failed availability or initialization.
    #[error("no storage backend available (tried: {})", .0.join("; "))]
    NoBackendAvailable(Vec<String>),

    /// A document failed shape validation before a write.
    #[error("invalid document: {0}")]
    Validation(String),

    /// The storage service was queried before a backend was selected.
    #[error("storage service is not initialized")]
    NotInitialized,

    /// A component was started without the collaborator it needs.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize a document.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The storage backend is not reachable (e.g. a worker task died).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl StorageError {
    /// Build an [`StorageError::Initialization`] for `backend`.
    pub fn initialization(backend: BackendKind, reason: impl Into<String>) -> Self {
        StorageError::Initialization {
            backend,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_display_names_backend() {
        let err = StorageError::initialization(BackendKind::FileSystem, "permission denied");
        assert_eq!(
            err.to_string(),
            "failed to initialize filesystem backend: permission denied"
        );
    }

    #[test]
    fn test_no_backend_available_lists_attempts() {
        let err = StorageError::NoBackendAvailable(vec![
            "filesystem: unavailable".to_string(),
            "memory: boom".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("filesystem: unavailable"));
        assert!(msg.contains("memory: boom"));
    }

    #[test]
    fn test_serde_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_io_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = StorageError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
    }
}
