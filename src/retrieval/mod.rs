//! Hybrid Retriever: BM25 ∪ dense → normalize → fuse →
//! MMR → rerank, fronted by the Search Cache.

mod fusion;
mod hybrid;

pub use fusion::{jaccard, mmr_select, normalize_minmax, token_set, weighted_fuse};
pub use hybrid::{HybridRetriever, RetrievalFilter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A materialized query hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub source_doc_id: String,
    pub text: String,
    pub metadata: Value,
    /// In `[0, 1]`.
    pub relevance_score: f64,
    /// Unnormalized cross-encoder score, present once reranking has run.
    pub raw_rerank_score: Option<f64>,
}
