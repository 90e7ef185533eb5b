//! Enrichment: metadata extraction via the LLM Gateway
//! under Vocabulary Store constraints.

mod types;

pub use types::{DateEntity, EnrichedMetadata, Entities, EnrichmentReport, PersonEntity};

use serde::Deserialize;
use serde_json::json;
use tracing::{instrument, warn};

use crate::document::Document;
use crate::error::RagError;
use crate::llm::LlmGateway;
use crate::vocabulary::{VocabKind, VocabularyStore};

/// Raw shape the LLM is asked to return in structured-output mode, before
/// vocabulary validation and entity sanity-checking are applied.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    entities: Entities,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    projects: Vec<String>,
    #[serde(default)]
    places: Vec<String>,
    #[serde(default)]
    reflection: Option<String>,
}

/// Drives the enrichment protocol: structured extraction, vocabulary
/// validation, entity verification, and fallback title generation.
pub struct EnrichmentService {
    gateway: std::sync::Arc<LlmGateway>,
    vocabulary: std::sync::Arc<VocabularyStore>,
    prompt_window_chars: usize,
}

impl EnrichmentService {
    #[must_use]
    pub fn new(
        gateway: std::sync::Arc<LlmGateway>,
        vocabulary: std::sync::Arc<VocabularyStore>,
        prompt_window_chars: usize,
    ) -> Self {
        Self {
            gateway,
            vocabulary,
            prompt_window_chars,
        }
    }

    /// Run the full enrichment protocol for `doc`.
    #[instrument(level = "trace", skip_all, fields(doc_id = %doc.short_id))]
    pub async fn enrich(&self, doc: &Document) -> Result<EnrichmentReport, RagError> {
        let (window, truncated) = truncate_to_window(&doc.raw_text, self.prompt_window_chars);
        let prompt = self.compose_prompt(doc, window);

        let response = self
            .gateway
            .call(&prompt, None, 0.0, Some(response_schema()))
            .await?;

        let raw: RawExtraction = match response.structured {
            Some(value) => serde_json::from_value(value).map_err(|e| RagError::SchemaViolation(e.to_string()))?,
            None => serde_json::from_str(&response.text).map_err(|e| RagError::SchemaViolation(e.to_string()))?,
        };

        let mut report = EnrichmentReport {
            truncated,
            ..Default::default()
        };

        let title = if raw.title.trim().is_empty() || raw.title.len() < 3 {
            generate_fallback_title(&doc.raw_text)
        } else {
            raw.title
        };

        let (entities, hallucinated) = verify_entities(raw.entities, &doc.raw_text);
        report.hallucinated_entities = hallucinated;
        for entity in &report.hallucinated_entities {
            warn!(doc_id = %doc.short_id, entity, "dropped hallucinated entity");
        }

        let topics = self.validate_and_record(VocabKind::Topic, raw.topics, &doc.short_id, &mut report).await?;
        let projects = self
            .validate_and_record(VocabKind::Project, raw.projects, &doc.short_id, &mut report)
            .await?;
        let places = self.validate_and_record(VocabKind::Place, raw.places, &doc.short_id, &mut report).await?;

        let complexity = compute_complexity(&doc.raw_text, &topics.accepted, &projects.accepted);

        report.metadata = Some(EnrichedMetadata {
            title,
            summary: truncate_chars(&raw.summary, 500),
            doc_type: doc.doc_type,
            complexity,
            entities,
            topics: topics.accepted,
            suggested_topics: topics.demoted,
            projects: projects.accepted,
            suggested_projects: projects.demoted,
            places: places.accepted,
            suggested_places: places.demoted,
            reflection: raw.reflection.map(|r| truncate_chars(&r, 500)),
            truncated,
        });

        Ok(report)
    }

    fn compose_prompt(&self, doc: &Document, window: &str) -> String {
        format!(
            "Extract only from the document above; never carry over from instructions or prior documents.\n\
             If a field has no evidence, return an empty list.\n\
             Titles: if the extracted title is generic or empty, generate a concise descriptive title of 3-15 words.\n\n\
             Filename: {}\nDetected type: {:?}\n\n\
             Known topics: {}\nKnown projects: {}\nKnown places: {}\n\n\
             Document content:\n{}",
            doc.filename,
            doc.doc_type,
            self.vocabulary.all(VocabKind::Topic).join(", "),
            self.vocabulary.all(VocabKind::Project).join(", "),
            self.vocabulary.all(VocabKind::Place).join(", "),
            window,
        )
    }

    async fn validate_and_record(
        &self,
        kind: VocabKind,
        proposed: Vec<String>,
        doc_id: &str,
        report: &mut EnrichmentReport,
    ) -> Result<ValidatedList, RagError> {
        let outcome = self.vocabulary.validate(kind, &proposed);
        for term in &outcome.demoted {
            self.vocabulary
                .record_suggestion(kind, term.clone(), doc_id.to_string(), None, chrono::Utc::now())
                .await?;
            report.demoted_terms.push((kind, term.clone()));
        }
        Ok(ValidatedList {
            accepted: outcome.accepted,
            demoted: outcome.demoted,
        })
    }
}

struct ValidatedList {
    accepted: Vec<String>,
    demoted: Vec<String>,
}

fn truncate_to_window(text: &str, window_chars: usize) -> (&str, bool) {
    if text.chars().count() <= window_chars {
        (text, false)
    } else {
        let byte_idx = text
            .char_indices()
            .nth(window_chars)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        (&text[..byte_idx], true)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

fn generate_fallback_title(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().take(12).collect();
    if words.is_empty() {
        "Untitled document".to_string()
    } else {
        words.join(" ")
    }
}

/// Drop any entity surface form that does not appear verbatim
/// (case-insensitive) in the source text, then apply the per-kind bound
/// list caps.
fn verify_entities(entities: Entities, source_text: &str) -> (Entities, Vec<String>) {
    let haystack = source_text.to_lowercase();
    let mut hallucinated = Vec::new();

    let mut people = Vec::new();
    for person in entities.people.into_iter().take(types::MAX_PEOPLE) {
        if haystack.contains(&person.name.to_lowercase()) {
            people.push(person);
        } else {
            hallucinated.push(person.name);
        }
    }

    let filter_strings = |items: Vec<String>, hallucinated: &mut Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .take(types::MAX_OTHER_ENTITY_LIST)
            .filter(|s| {
                let present = haystack.contains(&s.to_lowercase());
                if !present {
                    hallucinated.push(s.clone());
                }
                present
            })
            .collect()
    };

    let organizations = filter_strings(entities.organizations, &mut hallucinated);
    let places = filter_strings(entities.places, &mut hallucinated);
    let technologies = filter_strings(entities.technologies, &mut hallucinated);
    let numbers = filter_strings(entities.numbers, &mut hallucinated);

    let dates = entities
        .dates
        .into_iter()
        .take(types::MAX_OTHER_ENTITY_LIST)
        .filter(|d| {
            let present = haystack.contains(&d.value.to_lowercase());
            if !present {
                hallucinated.push(d.value.clone());
            }
            present
        })
        .collect();

    (
        Entities {
            people,
            organizations,
            places,
            technologies,
            dates,
            numbers,
        },
        hallucinated,
    )
}

/// Normalized function of chunk-count estimate and vocabulary coverage.
fn compute_complexity(text: &str, topics: &[String], projects: &[String]) -> f64 {
    let estimated_chunks = (crate::chunking::estimate_tokens(text) as f64 / 400.0).max(1.0);
    let size_component = (estimated_chunks.ln() / 10.0_f64.ln()).clamp(0.0, 1.0);
    let coverage_component = (((topics.len() + projects.len()) as f64) / 5.0).clamp(0.0, 1.0);
    (0.6 * size_component + 0.4 * coverage_component).clamp(0.0, 1.0)
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "summary": {"type": "string"},
            "entities": {"type": "object"},
            "topics": {"type": "array", "items": {"type": "string"}},
            "projects": {"type": "array", "items": {"type": "string"}},
            "places": {"type": "array", "items": {"type": "string"}},
            "reflection": {"type": ["string", "null"]}
        },
        "required": ["title", "summary"]
    })
}
