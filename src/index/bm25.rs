//! BM25 Index: in-memory Okapi BM25 over the chunk corpus.
//!
//! Tokenization is unicode word characters, lowercased, no stemming.
//! Writes are batched and the inverted index rebuilds lazily on the next
//! search, guarded by a `tokio::sync::RwLock`.

use std::collections::HashMap;

use tokio::sync::RwLock;
use unicode_segmentation::UnicodeSegmentation;

const K1: f64 = 1.5;
const B: f64 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

#[derive(Default)]
struct Document {
    term_freqs: HashMap<String, usize>,
    length: usize,
}

#[derive(Default)]
struct Built {
    /// term -> (chunk_id, term_freq) postings.
    postings: HashMap<String, Vec<(String, usize)>>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f64,
}

#[derive(Default)]
struct State {
    documents: HashMap<String, Document>,
    built: Option<Built>,
    dirty: bool,
}

/// In-memory BM25 (Okapi) lexical index.
pub struct Bm25Index {
    state: RwLock<State>,
}

impl Bm25Index {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Add or replace a chunk's text in the index. Deferred: the inverted
    /// index is not rebuilt until the next [`search`](Self::search).
    pub async fn add(&self, chunk_id: &str, text: &str) {
        let tokens = tokenize(text);
        let mut term_freqs = HashMap::new();
        for token in &tokens {
            *term_freqs.entry(token.clone()).or_insert(0) += 1;
        }
        let document = Document {
            length: tokens.len(),
            term_freqs,
        };
        let mut state = self.state.write().await;
        state.documents.insert(chunk_id.to_string(), document);
        state.dirty = true;
    }

    /// Remove a chunk from the index. Deferred like [`add`](Self::add).
    pub async fn remove(&self, chunk_id: &str) {
        let mut state = self.state.write().await;
        state.documents.remove(chunk_id);
        state.dirty = true;
    }

    /// Rebuild the inverted index if dirty, then score `query` against every
    /// indexed chunk, returning the top `k` by descending BM25 score.
    pub async fn search(&self, query: &str, k: usize) -> Vec<(String, f64)> {
        self.rebuild_if_dirty().await;

        let state = self.state.read().await;
        let Some(built) = &state.built else {
            return Vec::new();
        };
        let query_terms = tokenize(query);
        let n = state.documents.len() as f64;
        if n == 0.0 {
            return Vec::new();
        }

        let mut scores: HashMap<String, f64> = HashMap::new();
        for term in &query_terms {
            let Some(postings) = built.postings.get(term) else {
                continue;
            };
            let df = built.doc_freq.get(term).copied().unwrap_or(0) as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for (chunk_id, tf) in postings {
                let doc_len = state
                    .documents
                    .get(chunk_id)
                    .map(|d| d.length as f64)
                    .unwrap_or(built.avg_doc_len);
                let tf = *tf as f64;
                let denom = tf + K1 * (1.0 - B + B * doc_len / built.avg_doc_len.max(1.0));
                let score = idf * (tf * (K1 + 1.0)) / denom.max(1e-9);
                *scores.entry(chunk_id.clone()).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }

    async fn rebuild_if_dirty(&self) {
        let needs_rebuild = { self.state.read().await.dirty };
        if !needs_rebuild {
            return;
        }
        let mut state = self.state.write().await;
        if !state.dirty {
            return;
        }
        let mut postings: HashMap<String, Vec<(String, usize)>> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;
        for (chunk_id, document) in &state.documents {
            total_len += document.length;
            for (term, tf) in &document.term_freqs {
                postings
                    .entry(term.clone())
                    .or_default()
                    .push((chunk_id.clone(), *tf));
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let avg_doc_len = if state.documents.is_empty() {
            0.0
        } else {
            total_len as f64 / state.documents.len() as f64
        };
        state.built = Some(Built {
            postings,
            doc_freq,
            avg_doc_len,
        });
        state.dirty = false;
    }
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exact_term_match_ranks_above_unrelated_document() {
        let index = Bm25Index::new();
        index
            .add("c1", "SKU-12345 teardown report for the widget")
            .await;
        index
            .add("c2", "unrelated document about gardening tips")
            .await;

        let results = index.search("SKU-12345", 5).await;
        assert_eq!(results[0].0, "c1");
    }

    #[tokio::test]
    async fn removed_chunk_does_not_appear_in_results() {
        let index = Bm25Index::new();
        index.add("c1", "hello world").await;
        index.remove("c1").await;
        let results = index.search("hello", 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn empty_index_returns_empty_results() {
        let index = Bm25Index::new();
        assert!(index.search("anything", 5).await.is_empty());
    }
}
