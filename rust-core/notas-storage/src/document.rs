// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The document model shared by every backend.
//
// The storage core does not interpret documents beyond `id` and `title`:
// `content` is an opaque JSON payload and any further fields are carried
// through untouched in `extra`. Files written by the file-system backend may
// hold either a bare document or an export envelope; `StoredDocument`
// normalizes both into a `Document` right after parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;

/// Current version written into export envelopes.
pub const ENVELOPE_VERSION: u32 = 1;

/// The unit of storage.
///
/// `created_at`/`updated_at` serialize as RFC 3339 strings under the
/// `createdAt`/`updatedAt` keys and parse back into native timestamps.
///
/// # Example
///
/// ```rust
/// use notas_storage::document::Document;
///
/// let doc = Document::new("alpha", "Alpha")
///     .with_content(serde_json::json!({"blocks": []}))
///     .with_field("pinned", serde_json::json!(true));
///
/// let json = serde_json::to_value(&doc).unwrap();
/// assert_eq!(json["pinned"], true);
/// let back: Document = serde_json::from_value(json).unwrap();
/// assert_eq!(back, doc);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Caller-supplied identifier, stable across backends.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Opaque payload; `Null` when the document has no content.
    #[serde(default)]
    pub content: Value,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Fields the core does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Create a document with no content and no timestamps.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: Value::Null,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// Set the content payload.
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    /// Set both timestamps.
    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self.updated_at = Some(updated_at);
        self
    }

    /// Add an extra field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Stamp `updated_at` with the current time, and `created_at` if unset.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
    }

    /// Check the shape every backend requires before persisting.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.id.is_empty() {
            return Err(StorageError::Validation(
                "document id must be a non-empty string".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a document from untyped JSON, reporting shape problems as
    /// [`StorageError::Validation`] rather than a serde message.
    pub fn from_value(value: Value) -> Result<Self, StorageError> {
        let obj = value
            .as_object()
            .ok_or_else(|| StorageError::Validation("document must be a JSON object".to_string()))?;

        match obj.get("id") {
            Some(Value::String(id)) if !id.is_empty() => {}
            _ => {
                return Err(StorageError::Validation(
                    "document id must be a non-empty string".to_string(),
                ))
            }
        }
        if !matches!(obj.get("title"), Some(Value::String(_))) {
            return Err(StorageError::Validation(
                "document title must be a string".to_string(),
            ));
        }

        serde_json::from_value(value).map_err(|e| StorageError::Validation(e.to_string()))
    }
}

/// On-disk export envelope around a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEnvelope {
    /// Envelope format version.
    pub version: u32,
    /// When the envelope was written.
    pub exported_at: DateTime<Utc>,
    /// The wrapped document.
    pub document: Document,
}

impl DocumentEnvelope {
    /// Wrap `document` in a current-version envelope stamped now.
    pub fn wrap(document: Document) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            exported_at: Utc::now(),
            document,
        }
    }
}

/// Either accepted on-disk shape.
///
/// A top-level `id` marks a bare document, whatever else it carries; anything
/// else must be a complete envelope.
#[derive(Debug, Clone)]
pub enum StoredDocument {
    /// `{ version, exportedAt, document }`.
    Envelope(DocumentEnvelope),
    /// The document object itself.
    Raw(Document),
}

impl StoredDocument {
    /// Parse file bytes in either shape.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, StorageError> {
        let corrupted =
            |e: serde_json::Error| StorageError::CorruptedData(format!("unrecognized document file: {e}"));
        let value: Value = serde_json::from_slice(bytes).map_err(corrupted)?;
        if value.get("id").is_some() {
            serde_json::from_value(value)
                .map(StoredDocument::Raw)
                .map_err(corrupted)
        } else {
            serde_json::from_value(value)
                .map(StoredDocument::Envelope)
                .map_err(corrupted)
        }
    }

    /// Normalize to the canonical in-memory document.
    pub fn into_document(self) -> Document {
        match self {
            StoredDocument::Envelope(envelope) => envelope.document,
            StoredDocument::Raw(document) => document,
        }
    }
}
