//! The quality gate: scores `signalness` and, in gating mode, admits or
//! rejects a document before chunking.

use serde::{Deserialize, Serialize};

use crate::enrichment::EnrichedMetadata;

/// Per-document signal components and their weighted composite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalScore {
    pub quality: f64,
    pub novelty: f64,
    pub actionability: f64,
    pub recency: f64,
    /// Weighted composite of the four components above, in `[0, 1]`.
    pub signalness: f64,
}

/// Outcome of running the gate over a document's enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Score-only mode, or gating mode with `signalness >= threshold`.
    Admit,
    /// Gating mode with `signalness < threshold`: halts the pipeline with a
    /// non-error stop.
    Gated,
}

/// Corpus-level statistics the gate's novelty/recency components draw on.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusStats {
    /// Fraction of this document's accepted topics/projects already seen
    /// elsewhere in the corpus, in `[0, 1]`; lower means more novel.
    pub topic_overlap_ratio: f64,
    /// Document age in days at ingestion time, used for the recency decay.
    pub age_days: f64,
}

/// Weights for the four signal components; must sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct SignalWeights {
    pub quality: f64,
    pub novelty: f64,
    pub actionability: f64,
    pub recency: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            quality: 0.4,
            novelty: 0.3,
            actionability: 0.2,
            recency: 0.1,
        }
    }
}

/// Scores and, in gating mode, admits or rejects documents.
pub struct QualityGate {
    threshold: f64,
    enabled: bool,
    weights: SignalWeights,
}

impl QualityGate {
    #[must_use]
    pub fn new(threshold: f64, enabled: bool) -> Self {
        Self {
            threshold,
            enabled,
            weights: SignalWeights::default(),
        }
    }

    /// Compute the signal score for `metadata` given `corpus`.
    #[must_use]
    pub fn score(&self, metadata: &EnrichedMetadata, corpus: &CorpusStats) -> SignalScore {
        let quality = metadata.complexity.clamp(0.0, 1.0);
        let novelty = (1.0 - corpus.topic_overlap_ratio).clamp(0.0, 1.0);
        let actionability = if metadata.entities.people.is_empty()
            && metadata.entities.organizations.is_empty()
            && metadata.entities.dates.is_empty()
        {
            0.2
        } else {
            0.8
        };
        let recency = (1.0 / (1.0 + corpus.age_days / 30.0)).clamp(0.0, 1.0);

        let signalness = self.weights.quality * quality
            + self.weights.novelty * novelty
            + self.weights.actionability * actionability
            + self.weights.recency * recency;

        SignalScore {
            quality,
            novelty,
            actionability,
            recency,
            signalness: signalness.clamp(0.0, 1.0),
        }
    }

    /// Score `metadata` and decide admission. In score-only mode
    /// ([`QualityGate::new`] with `enabled = false`), always [`GateOutcome::Admit`].
    #[must_use]
    pub fn evaluate(&self, metadata: &EnrichedMetadata, corpus: &CorpusStats) -> (SignalScore, GateOutcome) {
        let score = self.score(metadata, corpus);
        let outcome = if self.enabled && score.signalness < self.threshold {
            GateOutcome::Gated
        } else {
            GateOutcome::Admit
        };
        (score, outcome)
    }
}
