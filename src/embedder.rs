//! Embedder adapter: optional pluggable embedding provider, consumed by
//! the vector store adapter when the backing index does not embed
//! natively.

use async_trait::async_trait;

/// Produces dense vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Vec<Vec<f32>>;
}

/// Deterministic embedder for tests: hashes each word into a fixed-width
/// vector so that lexically similar strings produce similar vectors without
/// requiring a real model.
pub struct MockEmbedder {
    dims: usize,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| embed_one(t, self.dims)).collect()
    }
}

fn embed_one(text: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims];
    for word in text.split_whitespace().map(str::to_lowercase) {
        let bucket = word_hash(&word) % dims as u64;
        vector[bucket as usize] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

fn word_hash(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cosine similarity in `[-1, 1]`; `VectorStore` adapters convert this to a
/// distance (`1 - cos_sim`) before applying the `sim = clamp(1 -
/// distance, 0, 1)` conversion so the contract stays uniform regardless of
/// backend.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::default();
        let a = embedder.embed(&["hello world".to_string()]).await;
        let b = embedder.embed(&["hello world".to_string()]).await;
        assert_eq!(a, b);
    }

    #[test]
    fn cosine_similarity_is_one_for_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
