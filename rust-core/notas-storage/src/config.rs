// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! Storage configuration.
//!
//! One serde tree with defaults for every field, loadable from a JSON file and
//! overridable from `NOTAS_*` environment variables:
//!
//! | Variable                      | Field                      |
//! |-------------------------------|----------------------------|
//! | `NOTAS_BACKEND`               | `preferred_backend`        |
//! | `NOTAS_DOCUMENTS_DIR`         | `documents_dir`            |
//! | `NOTAS_LOCAL_DB_PATH`         | `local_db_path`            |
//! | `NOTAS_HANDLE_STORE`          | `handle_store_path`        |
//! | `NOTAS_CACHE_ENABLED`         | `cache.enabled`            |
//! | `NOTAS_CACHE_MAX_ENTRIES`     | `cache.max_entries`        |
//! | `NOTAS_CACHE_TTL_SECS`        | `cache.ttl_seconds`        |
//! | `NOTAS_WATCH_INTERVAL_MS`     | `watcher.interval_ms`      |
//! | `NOTAS_MIGRATION_BATCH_SIZE`  | `migration.batch_size`     |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::BackendKind;
use crate::cache::CacheConfig;
use crate::error::StorageError;
use crate::migration::MigrationConfig;
use crate::watcher::DEFAULT_POLL_INTERVAL;

/// File watcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Poll period in milliseconds.
    pub interval_ms: u64,
}

impl WatcherConfig {
    /// The poll interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// Top-level configuration for the storage service and its collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to select instead of walking the default priority order.
    pub preferred_backend: Option<BackendKind>,
    /// Directory for the file-system backend.
    pub documents_dir: Option<PathBuf>,
    /// Database file for the indexed local backend.
    pub local_db_path: Option<PathBuf>,
    /// Where the last chosen document directory is remembered.
    pub handle_store_path: Option<PathBuf>,
    pub cache: CacheConfig,
    pub watcher: WatcherConfig,
    pub migration: MigrationConfig,
}

impl StorageConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "loaded storage configuration");
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, StorageError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) -> Result<(), StorageError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`, which maps a variable name to its
    /// value. Unset and empty variables leave the field alone; unparsable
    /// values fail with [`StorageError::NotConfigured`].
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), StorageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("NOTAS_BACKEND") {
            self.preferred_backend = Some(BackendKind::from_str(&v)?);
        }
        if let Some(v) = get("NOTAS_DOCUMENTS_DIR") {
            self.documents_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("NOTAS_LOCAL_DB_PATH") {
            self.local_db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("NOTAS_HANDLE_STORE") {
            self.handle_store_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("NOTAS_CACHE_ENABLED") {
            self.cache.enabled = parse_bool("NOTAS_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = get("NOTAS_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_number("NOTAS_CACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = get("NOTAS_CACHE_TTL_SECS") {
            self.cache.ttl_seconds = parse_number("NOTAS_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = get("NOTAS_WATCH_INTERVAL_MS") {
            self.watcher.interval_ms = parse_number("NOTAS_WATCH_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("NOTAS_MIGRATION_BATCH_SIZE") {
            self.migration.batch_size = parse_number("NOTAS_MIGRATION_BATCH_SIZE", &v)?;
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, StorageError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(StorageError::NotConfigured(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, StorageError> {
    value.trim().parse().map_err(|_| {
        StorageError::NotConfigured(format!("{key}: expected a number, got '{value}'"))
    })
}
