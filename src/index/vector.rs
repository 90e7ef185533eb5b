//! Vector store adapter: thin contract over an external vector index,
//! owning format conversion at the storage boundary.
//!
//! [`MemoryVectorStore`] is the deterministic in-process implementation
//! used by tests and the `demos/` binary. [`SqliteVectorStore`] is the
//! shipped default: raw SQL over `tokio-rusqlite` with the `sqlite-vec`
//! extension providing `vec_distance_cosine`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::embedder::{Embedder, cosine_similarity};
use crate::error::RagError;

/// Flat metadata map, the storage boundary's sole representation.
pub type FlatMetadata = HashMap<String, String>;

/// Contract consumed by the hybrid retriever for dense retrieval.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, chunk_id: &str, text: &str, flat_metadata: FlatMetadata) -> Result<(), RagError>;

    /// Returns up to `k` hits as `(chunk_id, distance, text, flat_metadata)`;
    /// distance is in `[0, ∞)`. `filter` is applied pre-query if supported.
    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&FlatMetadata>,
    ) -> Result<Vec<(String, f64, String, FlatMetadata)>, RagError>;

    async fn delete(&self, chunk_id: &str) -> Result<(), RagError>;
    async fn delete_by_filter(&self, filter: &FlatMetadata) -> Result<(), RagError>;
}

/// `sim = clamp(1 − distance, 0, 1)`.
#[must_use]
pub fn distance_to_similarity(distance: f64) -> f64 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Flatten a `serde_json::Value` into the storage boundary's flat shape:
/// lists become comma-joined strings, nested objects become dot-path keys,
/// null values are elided entirely.
#[must_use]
pub fn flatten_metadata(value: &Value) -> FlatMetadata {
    let mut out = HashMap::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, prefix: String, out: &mut FlatMetadata) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            if prefix.is_empty() {
                return;
            }
            let joined = items
                .iter()
                .filter_map(|item| scalar_to_string(item))
                .collect::<Vec<_>>()
                .join(",");
            if !joined.is_empty() {
                out.insert(prefix, joined);
            }
        }
        Value::Object(map) => {
            for (key, val) in map {
                let next_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(val, next_prefix, out);
            }
        }
        other => {
            if !prefix.is_empty() {
                if let Some(s) = scalar_to_string(other) {
                    out.insert(prefix, s);
                }
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Reverse of [`flatten_metadata`]: split comma-joined values back into
/// arrays, strip whitespace, drop empties, and reconstruct dot-path nesting.
#[must_use]
pub fn parse_flat_metadata(flat: &FlatMetadata) -> Value {
    let mut root = serde_json::Map::new();
    for (key, value) in flat {
        let parts: Vec<&str> = key.split('.').collect();
        insert_path(&mut root, &parts, value);
    }
    Value::Object(root)
}

fn insert_path(map: &mut serde_json::Map<String, Value>, parts: &[&str], value: &str) {
    match parts {
        [] => {}
        [last] => {
            map.insert((*last).to_string(), parsed_scalar_or_list(value));
        }
        [head, tail @ ..] => {
            let entry = map
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(nested) = entry {
                insert_path(nested, tail, value);
            }
        }
    }
}

fn parsed_scalar_or_list(value: &str) -> Value {
    if value.contains(',') {
        let items: Vec<Value> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect();
        Value::Array(items)
    } else {
        Value::String(value.to_string())
    }
}

struct StoredRecord {
    text: String,
    flat_metadata: FlatMetadata,
    embedding: Vec<f32>,
}

/// Deterministic in-memory [`VectorStore`] for tests and demos. Embeds via
/// an injected [`Embedder`] and ranks by cosine distance.
pub struct MemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl MemoryVectorStore {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of chunks currently stored.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

fn matches_filter(flat_metadata: &FlatMetadata, filter: &FlatMetadata) -> bool {
    filter
        .iter()
        .all(|(k, v)| flat_metadata.get(k).is_some_and(|actual| actual == v))
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    #[instrument(level = "trace", skip_all, fields(chunk_id = chunk_id))]
    async fn upsert(&self, chunk_id: &str, text: &str, flat_metadata: FlatMetadata) -> Result<(), RagError> {
        let embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_default();
        self.records.write().await.insert(
            chunk_id.to_string(),
            StoredRecord {
                text: text.to_string(),
                flat_metadata,
                embedding,
            },
        );
        Ok(())
    }

    #[instrument(level = "trace", skip_all)]
    async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&FlatMetadata>,
    ) -> Result<Vec<(String, f64, String, FlatMetadata)>, RagError> {
        let query_embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_default();

        let records = self.records.read().await;
        let mut scored: Vec<(String, f64, String, FlatMetadata)> = records
            .iter()
            .filter(|(_, record)| filter.is_none_or(|f| matches_filter(&record.flat_metadata, f)))
            .map(|(chunk_id, record)| {
                let sim = cosine_similarity(&query_embedding, &record.embedding);
                let distance = (1.0 - sim as f64).max(0.0);
                (
                    chunk_id.clone(),
                    distance,
                    record.text.clone(),
                    record.flat_metadata.clone(),
                )
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete(&self, chunk_id: &str) -> Result<(), RagError> {
        self.records.write().await.remove(chunk_id);
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &FlatMetadata) -> Result<(), RagError> {
        self.records
            .write()
            .await
            .retain(|_, record| !matches_filter(&record.flat_metadata, filter));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use serde_json::json;

    #[test]
    fn flatten_joins_lists_and_dot_paths_nested_objects() {
        let value = json!({
            "topics": ["technology/ai", "technology/ml"],
            "entities": { "people": ["Alice", "Bob"] },
            "reflection": null,
        });
        let flat = flatten_metadata(&value);
        assert_eq!(flat.get("topics").unwrap(), "technology/ai,technology/ml");
        assert_eq!(flat.get("entities.people").unwrap(), "Alice,Bob");
        assert!(!flat.contains_key("reflection"));
    }

    #[test]
    fn parse_is_approximate_inverse_of_flatten() {
        let value = json!({ "topics": ["a", "b"], "nested": { "k": "v" } });
        let flat = flatten_metadata(&value);
        let parsed = parse_flat_metadata(&flat);
        assert_eq!(parsed["topics"], json!(["a", "b"]));
        assert_eq!(parsed["nested"]["k"], json!("v"));
    }

    #[tokio::test]
    async fn upsert_then_query_returns_chunk_at_rank_one() {
        let store = MemoryVectorStore::new(Arc::new(MockEmbedder::default()));
        store
            .upsert("c1", "daycare enrollment forms", FlatMetadata::new())
            .await
            .unwrap();
        store
            .upsert("c2", "unrelated gardening content", FlatMetadata::new())
            .await
            .unwrap();

        let results = store
            .query("daycare enrollment forms", 5, None)
            .await
            .unwrap();
        assert_eq!(results[0].0, "c1");
    }

    #[tokio::test]
    async fn filter_excludes_non_matching_chunks() {
        let store = MemoryVectorStore::new(Arc::new(MockEmbedder::default()));
        let mut meta_a = FlatMetadata::new();
        meta_a.insert("doc_type".to_string(), "markdown".to_string());
        store.upsert("c1", "hello", meta_a).await.unwrap();

        let mut meta_b = FlatMetadata::new();
        meta_b.insert("doc_type".to_string(), "email".to_string());
        store.upsert("c2", "hello", meta_b).await.unwrap();

        let mut filter = FlatMetadata::new();
        filter.insert("doc_type".to_string(), "email".to_string());
        let results = store.query("hello", 5, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "c2");
    }

    #[test]
    fn distance_to_similarity_clamps_to_unit_range() {
        assert_eq!(distance_to_similarity(-1.0), 1.0);
        assert_eq!(distance_to_similarity(2.0), 0.0);
        assert!((distance_to_similarity(0.25) - 0.75).abs() < 1e-9);
    }
}
