//! Cross-encoder reranker adapter.

use async_trait::async_trait;

/// Scores `(query, passage)` pairs jointly, returning unbounded real scores.
/// [`crate::retrieval`] maps these into `[0, 1]` via sigmoid.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, passages: &[String]) -> Vec<f32>;
}

/// Deterministic test double: scores by normalized token overlap with the
/// query, scaled into a plausible raw cross-encoder range.
pub struct MockReranker;

#[async_trait]
impl Reranker for MockReranker {
    async fn rerank(&self, query: &str, passages: &[String]) -> Vec<f32> {
        let query_terms: std::collections::HashSet<String> =
            query.split_whitespace().map(|w| w.to_lowercase()).collect();
        passages
            .iter()
            .map(|passage| {
                let passage_terms: std::collections::HashSet<String> =
                    passage.split_whitespace().map(|w| w.to_lowercase()).collect();
                let overlap = query_terms.intersection(&passage_terms).count() as f32;
                let denom = query_terms.len().max(1) as f32;
                (overlap / denom) * 8.0 - 4.0
            })
            .collect()
    }
}

/// `1 / (1 + e^-x)`; maps a raw rerank score into `[0, 1]` while preserving
/// ordering.
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_stays_in_unit_range() {
        for x in [-100.0, -1.0, 0.0, 1.0, 100.0] {
            let s = sigmoid(x);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn sigmoid_is_monotonic() {
        assert!(sigmoid(1.0) > sigmoid(0.0));
        assert!(sigmoid(0.0) > sigmoid(-1.0));
    }

    #[tokio::test]
    async fn mock_reranker_scores_exact_overlap_highest() {
        let reranker = MockReranker;
        let scores = reranker
            .rerank(
                "daycare enrollment",
                &[
                    "daycare enrollment forms".to_string(),
                    "unrelated gardening text".to_string(),
                ],
            )
            .await;
        assert!(scores[0] > scores[1]);
    }
}
