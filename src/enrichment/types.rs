//! `EnrichedMetadata` data model.

use serde::{Deserialize, Serialize};

/// A person entity, optionally with a role.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersonEntity {
    pub name: String,
    pub role: Option<String>,
}

/// A date entity with optional surrounding context.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DateEntity {
    pub value: String,
    pub context: Option<String>,
}

/// Extracted entities, each list independently bounded.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Entities {
    /// Bounded at 50.
    pub people: Vec<PersonEntity>,
    /// Bounded at 20.
    pub organizations: Vec<String>,
    /// Bounded at 20.
    pub places: Vec<String>,
    /// Bounded at 20.
    pub technologies: Vec<String>,
    /// Bounded at 20.
    pub dates: Vec<DateEntity>,
    /// Bounded at 20.
    pub numbers: Vec<String>,
}

pub const MAX_PEOPLE: usize = 50;
pub const MAX_OTHER_ENTITY_LIST: usize = 20;

/// Controlled metadata attached to a document after enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedMetadata {
    /// 3-200 chars.
    pub title: String,
    /// <=500 chars.
    pub summary: String,
    pub doc_type: crate::document::DocType,
    /// In `[0, 1]`.
    pub complexity: f64,
    pub entities: Entities,
    /// Topics accepted into the controlled vocabulary.
    pub topics: Vec<String>,
    /// Topics proposed but not yet in the vocabulary.
    pub suggested_topics: Vec<String>,
    pub projects: Vec<String>,
    pub suggested_projects: Vec<String>,
    pub places: Vec<String>,
    pub suggested_places: Vec<String>,
    /// <=500 chars, optional.
    pub reflection: Option<String>,
    /// Whether the enrichment prompt window truncated the source document.
    pub truncated: bool,
}

/// Non-error conditions recorded during enrichment: dropped
/// hallucinated entities and demoted vocabulary suggestions. Logged via
/// `tracing::warn!`, never surfaced as an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub metadata: Option<EnrichedMetadata>,
    /// Entity surface forms dropped because they did not appear verbatim
    /// (case-insensitive) in the source document.
    pub hallucinated_entities: Vec<String>,
    /// `(kind, term)` pairs demoted to suggestions.
    pub demoted_terms: Vec<(crate::vocabulary::VocabKind, String)>,
    pub truncated: bool,
}
