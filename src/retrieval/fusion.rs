//! Score normalization, weighted fusion, and MMR diversity selection:
//! min-max normalization feeding a weighted sum, then Jaccard-based MMR
//! for redundancy control.

use std::collections::{HashMap, HashSet};

/// Min-max normalize `scores` into `[0, 1]`. If all scores are equal
/// (`max == min`), every score normalizes to `0.5`.
#[must_use]
pub fn normalize_minmax(scores: &[(String, f64)]) -> HashMap<String, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = scores.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
    scores
        .iter()
        .map(|(id, s)| {
            let norm = if max > min { (s - min) / (max - min) } else { 0.5 };
            (id.clone(), norm)
        })
        .collect()
}

/// Weighted fusion of two normalized score maps. Chunk ids missing from one
/// map are treated as normalized `0` in that list.
#[must_use]
pub fn weighted_fuse(
    norm_bm25: &HashMap<String, f64>,
    norm_dense: &HashMap<String, f64>,
    w_bm25: f64,
    w_dense: f64,
) -> Vec<(String, f64)> {
    let ids: HashSet<&String> = norm_bm25.keys().chain(norm_dense.keys()).collect();
    let mut fused: Vec<(String, f64)> = ids
        .into_iter()
        .map(|id| {
            let bm25 = norm_bm25.get(id).copied().unwrap_or(0.0);
            let dense = norm_dense.get(id).copied().unwrap_or(0.0);
            (id.clone(), w_bm25 * bm25 + w_dense * dense)
        })
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    fused
}

/// Jaccard similarity over token sets, the intra-result similarity metric
/// used by MMR.
#[must_use]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 { 0.0 } else { intersection / union }
}

/// Iteratively select up to `limit` chunks maximizing
/// `λ·fused(c) − (1−λ)·max_{c'∈S} jaccard(tokens(c), tokens(c'))`.
#[must_use]
pub fn mmr_select(
    candidates: &[(String, f64)],
    token_sets: &HashMap<String, HashSet<String>>,
    lambda: f64,
    limit: usize,
) -> Vec<String> {
    let mut remaining: Vec<(String, f64)> = candidates.to_vec();
    let mut selected: Vec<String> = Vec::new();
    let empty_set: HashSet<String> = HashSet::new();

    while selected.len() < limit && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (idx, (id, relevance)) in remaining.iter().enumerate() {
            let tokens = token_sets.get(id).unwrap_or(&empty_set);
            let max_sim = selected
                .iter()
                .map(|sel_id| jaccard(tokens, token_sets.get(sel_id).unwrap_or(&empty_set)))
                .fold(0.0_f64, f64::max);
            let mmr_score = lambda * relevance - (1.0 - lambda) * max_sim;
            if mmr_score > best_score || (mmr_score == best_score && id < &remaining[best_idx].0) {
                best_score = mmr_score;
                best_idx = idx;
            }
        }
        let (chosen_id, _) = remaining.remove(best_idx);
        selected.push(chosen_id);
    }
    selected
}

/// Tokenize text into a lowercased word set for Jaccard comparisons.
#[must_use]
pub fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handles_equal_scores_with_half() {
        let scores = vec![("a".to_string(), 1.0), ("b".to_string(), 1.0)];
        let norm = normalize_minmax(&scores);
        assert_eq!(norm["a"], 0.5);
        assert_eq!(norm["b"], 0.5);
    }

    #[test]
    fn normalize_scales_to_unit_range() {
        let scores = vec![("a".to_string(), 0.0), ("b".to_string(), 10.0)];
        let norm = normalize_minmax(&scores);
        assert_eq!(norm["a"], 0.0);
        assert_eq!(norm["b"], 1.0);
    }

    #[test]
    fn weighted_fuse_treats_missing_ids_as_zero() {
        let mut bm25 = HashMap::new();
        bm25.insert("a".to_string(), 1.0);
        let mut dense = HashMap::new();
        dense.insert("b".to_string(), 1.0);

        let fused = weighted_fuse(&bm25, &dense, 0.3, 0.7);
        let a_score = fused.iter().find(|(id, _)| id == "a").unwrap().1;
        let b_score = fused.iter().find(|(id, _)| id == "b").unwrap().1;
        assert!((a_score - 0.3).abs() < 1e-9);
        assert!((b_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn mmr_prefers_diverse_candidates_over_near_duplicates() {
        let candidates = vec![
            ("dup1".to_string(), 0.9),
            ("dup2".to_string(), 0.89),
            ("dup3".to_string(), 0.88),
            ("different".to_string(), 0.5),
        ];
        let mut token_sets = HashMap::new();
        token_sets.insert("dup1".to_string(), token_set("daycare enrollment form"));
        token_sets.insert("dup2".to_string(), token_set("daycare enrollment form"));
        token_sets.insert("dup3".to_string(), token_set("daycare enrollment form"));
        token_sets.insert("different".to_string(), token_set("completely unrelated topic"));

        let selected = mmr_select(&candidates, &token_sets, 0.5, 3);
        assert!(selected.contains(&"different".to_string()));
    }
}
