//! Crate-wide error type.
//!
//! Every fallible operation in this crate returns `Result<T, RagError>`.
//! Recoverable per-document conditions (`HallucinatedEntity`,
//! `UnknownVocabularyTerm`) are not represented here — they are folded into
//! [`crate::enrichment::EnrichmentReport`] and logged, never surfaced as
//! errors.

use thiserror::Error;

/// The crate's unified error type.
#[derive(Debug, Error)]
pub enum RagError {
    /// Filesystem I/O failure (vocabulary files, suggestion log, ledger snapshot).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Vector store or BM25 persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Chunking could not produce a valid split for the input.
    #[error("chunking error: {0}")]
    Chunking(String),

    /// Vocabulary loading or validation failure.
    #[error("vocabulary error: {0}")]
    Vocabulary(String),

    /// Invalid configuration supplied to a builder.
    #[error("configuration error: {0}")]
    Config(String),

    /// All providers in the LLM gateway's fallback chain failed.
    #[error("all providers failed: {0}")]
    AllProvidersFailed(String),

    /// Structured-output validation failed after retries.
    #[error("schema violation: offending text follows\n{0}")]
    SchemaViolation(String),

    /// The daily cost budget has been exhausted; no call was dispatched.
    #[error("daily budget exceeded")]
    BudgetExceeded,

    /// The operation was cancelled before completion.
    #[error("cancelled")]
    Cancelled,

    /// The bounded in-flight ingestion slot pool is full.
    #[error("busy: in-flight capacity exhausted")]
    Busy,

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `.toml` (de)serialization failure.
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
