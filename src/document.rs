//! The [`Document`] type: the unit of ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Detected document type, influencing chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Email,
    Markdown,
    Pdf,
    Image,
    Chat,
    Generic,
}

/// A unit of ingestion, identified by the SHA-256 hash of its raw text.
///
/// The identifier uniquely determines the raw text: re-ingesting identical
/// content is always a no-op (see [`crate::pipeline::PipelineOutcome::Duplicate`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Full 64-hex-character SHA-256 digest of `raw_text`.
    pub content_hash: String,
    /// First 12 hex characters of `content_hash`, used in chunk ids.
    pub short_id: String,
    /// Original filename as supplied by the caller.
    pub filename: String,
    /// Detected document type.
    pub doc_type: DocType,
    /// Raw, unenriched text.
    pub raw_text: String,
    /// Timestamp the underlying content was originally authored, if known.
    pub created_at: Option<DateTime<Utc>>,
    /// Timestamp this document was handed to the pipeline.
    pub ingested_at: DateTime<Utc>,
    /// Filesystem or URL path the content was read from, if any.
    pub source_path: Option<String>,
}

impl Document {
    /// Build a new `Document`, computing its content hash from `raw_text`.
    pub fn new(
        filename: impl Into<String>,
        doc_type: DocType,
        raw_text: impl Into<String>,
        created_at: Option<DateTime<Utc>>,
        source_path: Option<String>,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        let raw_text = raw_text.into();
        let content_hash = hash_content(&raw_text);
        let short_id = content_hash[..12].to_string();
        Self {
            content_hash,
            short_id,
            filename: filename.into(),
            doc_type,
            raw_text,
            created_at,
            ingested_at,
            source_path,
        }
    }
}

/// SHA-256 hex digest of `text`, used both for document identity and for
/// the chunk id prefix (`{doc_short_id}_chunk_{sequence}`).
#[must_use]
pub fn hash_content(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
