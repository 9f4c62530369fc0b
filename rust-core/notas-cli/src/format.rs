// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! Output formatting for the notas CLI.

use std::fmt;

use comfy_table::{Cell, ContentArrangement, Table};
use notas_storage::migration::{MigrationPhase, MigrationProgress};
use notas_storage::Document;

/// Available output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown format '{other}'. Valid formats: table, json")),
        }
    }
}

/// Render a document listing.
pub fn format_documents(docs: &[Document], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(docs)
            .unwrap_or_else(|e| format!("<unserializable listing: {e}>")),
        OutputFormat::Table => {
            if docs.is_empty() {
                return "(no documents)".to_string();
            }
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["id", "title", "updated"]);
            for doc in docs {
                let updated = doc
                    .updated_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                table.add_row(vec![
                    Cell::new(&doc.id),
                    Cell::new(&doc.title),
                    Cell::new(updated),
                ]);
            }
            table.to_string()
        }
    }
}

/// One-line progress summary, or `None` for updates not worth printing.
pub fn format_progress(progress: &MigrationProgress) -> Option<String> {
    match progress.phase {
        MigrationPhase::Preparing => Some("preparing migration".to_string()),
        MigrationPhase::Migrating => Some(format!(
            "[{}/{}] {}",
            progress.current,
            progress.total,
            progress.current_item.as_deref().unwrap_or("starting")
        )),
        MigrationPhase::Complete => Some(format!(
            "complete: {} processed, {} failed",
            progress.current,
            progress.errors.len()
        )),
        MigrationPhase::Error => Some("migration aborted".to_string()),
    }
}
