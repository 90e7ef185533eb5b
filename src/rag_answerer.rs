//! The RAG answerer: hybrid search, a confidence composite, and a
//! low-confidence refusal gate ahead of the LLM call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::RagError;
use crate::llm::LlmGateway;
use crate::quality_gate::SignalScore;
use crate::retrieval::{HybridRetriever, RetrievalFilter, SearchResult};

const DEFAULT_TOP_K: usize = 5;
const REFUSAL_TEXT: &str =
    "I don't have enough confidence in the retrieved context to answer this reliably. Here is what was found:";

/// A fully answered or refused question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SearchResult>,
    pub cost_usd: f64,
    pub model_used: Option<String>,
    pub confidence: f64,
}

/// Composes retrieval and generation into a single question-answering call.
pub struct RagAnswerer {
    retriever: Arc<HybridRetriever>,
    gateway: Arc<LlmGateway>,
    confidence_threshold: f64,
}

impl RagAnswerer {
    #[must_use]
    pub fn new(retriever: Arc<HybridRetriever>, gateway: Arc<LlmGateway>, confidence_threshold: f64) -> Self {
        Self {
            retriever,
            gateway,
            confidence_threshold,
        }
    }

    /// Answer `question`, refusing if the confidence composite falls below
    /// the configured threshold (default 0.6).
    #[instrument(level = "trace", skip(self), fields(top_k))]
    pub async fn answer(
        &self,
        question: &str,
        requested_model: Option<&str>,
        top_k: Option<usize>,
        filter: Option<&RetrievalFilter>,
        source_signalness: &[f64],
    ) -> Result<Answer, RagError> {
        let top_k = top_k.unwrap_or(DEFAULT_TOP_K);
        let sources = self.retriever.search(question, top_k, filter).await?;

        let confidence = compute_confidence(question, &sources, source_signalness);

        if confidence < self.confidence_threshold {
            return Ok(Answer {
                answer: format!("{REFUSAL_TEXT} {} source(s) found.", sources.len()),
                sources,
                cost_usd: 0.0,
                model_used: None,
                confidence,
            });
        }

        let prompt = compose_prompt(question, &sources);
        let response = self.gateway.call(&prompt, requested_model, 0.2, None).await?;

        Ok(Answer {
            answer: response.text,
            sources,
            cost_usd: response.cost_usd,
            model_used: Some(response.model_used),
            confidence,
        })
    }
}

fn content_words(text: &str) -> std::collections::HashSet<String> {
    const STOPWORDS: &[&str] = &[
        "the", "a", "an", "is", "are", "was", "were", "of", "to", "in", "on", "for", "and", "or",
        "what", "how", "why", "does", "do", "did",
    ];
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Weighted composite: 50% mean top-3 relevance, 30% question content-word
/// coverage in the retrieved text, 20% mean source signalness.
fn compute_confidence(question: &str, sources: &[SearchResult], source_signalness: &[f64]) -> f64 {
    if sources.is_empty() {
        return 0.0;
    }

    let relevance = {
        let top3: Vec<f64> = sources.iter().take(3).map(|s| s.relevance_score).collect();
        top3.iter().sum::<f64>() / top3.len() as f64
    };

    let coverage = {
        let question_words = content_words(question);
        if question_words.is_empty() {
            1.0
        } else {
            let combined_text = sources
                .iter()
                .map(|s| s.text.to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            let present = question_words
                .iter()
                .filter(|w| combined_text.contains(w.as_str()))
                .count();
            present as f64 / question_words.len() as f64
        }
    };

    let quality = if source_signalness.is_empty() {
        0.5
    } else {
        source_signalness.iter().sum::<f64>() / source_signalness.len() as f64
    };

    (0.5 * relevance + 0.3 * coverage + 0.2 * quality).clamp(0.0, 1.0)
}

/// Mean [`SignalScore::signalness`] across a set of source documents,
/// convenience for callers that track per-document gate scores.
#[must_use]
pub fn mean_signalness(scores: &[SignalScore]) -> f64 {
    if scores.is_empty() {
        return 0.5;
    }
    scores.iter().map(|s| s.signalness).sum::<f64>() / scores.len() as f64
}

fn compose_prompt(question: &str, sources: &[SearchResult]) -> String {
    let mut prompt = format!(
        "Answer the question using only the sources below. Cite sources by their marker.\n\nQuestion: {question}\n\nSources:\n"
    );
    for (i, source) in sources.iter().enumerate() {
        prompt.push_str(&format!("[S{}] ({}): {}\n", i + 1, source.source_doc_id, source.text));
    }
    prompt
}
