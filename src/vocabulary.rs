//! The vocabulary store.
//!
//! Loads controlled vocabularies (topics, projects, people, places) from
//! declarative TOML sources into normalized sets, preserving hierarchical
//! keys such as `technology/ai`. Read-mostly; unknown terms are recorded to
//! an append-only suggestions log rather than silently admitted, guarded by
//! an `Arc<Mutex<..>>` over the in-memory log with on-disk persistence.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RagError;

/// A controlled-vocabulary category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabKind {
    Topic,
    Project,
    People,
    Place,
}

impl VocabKind {
    fn file_stem(self) -> &'static str {
        match self {
            Self::Topic => "topics",
            Self::Project => "projects",
            Self::People => "people",
            Self::Place => "places",
        }
    }
}

/// One recorded unknown-term suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: VocabKind,
    pub term: String,
    pub source_doc_id: String,
    pub ts: DateTime<Utc>,
    /// Free-text context the term was extracted from, if any.
    pub context: Option<String>,
}

/// On-disk declarative form: one TOML file per kind, a flat list of
/// hierarchical path strings (e.g. `"technology/ai"`).
#[derive(Debug, Deserialize, Default)]
struct VocabFile {
    #[serde(default)]
    terms: Vec<String>,
}

/// Result of validating a caller-proposed term against the vocabulary.
pub struct ValidationOutcome {
    /// Terms that are members of the vocabulary, unchanged.
    pub accepted: Vec<String>,
    /// Terms that were not found and should be recorded as suggestions.
    pub demoted: Vec<String>,
}

/// Process-scoped vocabulary service: load at init, validate, and suggest.
pub struct VocabularyStore {
    sets: [HashSet<String>; 4],
    ordered: [Vec<String>; 4],
    suggestions_log_path: Option<PathBuf>,
    suggestions: Arc<Mutex<Vec<Suggestion>>>,
}

impl VocabularyStore {
    /// Load all four vocabularies from `dir`, expecting `topics.toml`,
    /// `projects.toml`, `people.toml`, `places.toml`. A missing file is
    /// treated as an empty vocabulary for that kind.
    pub async fn load_from_dir(
        dir: impl AsRef<Path>,
        suggestions_log_path: Option<PathBuf>,
    ) -> Result<Self, RagError> {
        let dir = dir.as_ref();
        let kinds = [
            VocabKind::Topic,
            VocabKind::Project,
            VocabKind::People,
            VocabKind::Place,
        ];
        let mut sets: [HashSet<String>; 4] = Default::default();
        let mut ordered: [Vec<String>; 4] = Default::default();
        for (idx, kind) in kinds.iter().enumerate() {
            let path = dir.join(format!("{}.toml", kind.file_stem()));
            let terms = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => {
                    let parsed: VocabFile = toml::from_str(&raw)?;
                    parsed.terms
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(RagError::Io(e)),
            };
            sets[idx] = terms.iter().cloned().collect();
            ordered[idx] = terms;
        }
        Ok(Self {
            sets,
            ordered,
            suggestions_log_path,
            suggestions: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Build an empty, in-memory vocabulary store (for tests or callers
    /// that assemble vocabularies programmatically).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            sets: Default::default(),
            ordered: Default::default(),
            suggestions_log_path: None,
            suggestions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Insert a term directly (test/programmatic construction helper).
    pub fn insert(&mut self, kind: VocabKind, term: impl Into<String>) {
        let term = term.into();
        let idx = Self::index(kind);
        if self.sets[idx].insert(term.clone()) {
            self.ordered[idx].push(term);
        }
    }

    fn index(kind: VocabKind) -> usize {
        match kind {
            VocabKind::Topic => 0,
            VocabKind::Project => 1,
            VocabKind::People => 2,
            VocabKind::Place => 3,
        }
    }

    /// Exact-match membership test on the full hierarchical path.
    #[must_use]
    pub fn is_valid(&self, kind: VocabKind, term: &str) -> bool {
        self.sets[Self::index(kind)].contains(term)
    }

    /// All known terms for `kind`, in declaration order.
    #[must_use]
    pub fn all(&self, kind: VocabKind) -> &[String] {
        &self.ordered[Self::index(kind)]
    }

    /// Split `proposed` into accepted (valid) and demoted (unknown) terms.
    /// Does not itself record suggestions; callers pair this with
    /// [`record_suggestion`](Self::record_suggestion) for each demoted term.
    #[must_use]
    pub fn validate(&self, kind: VocabKind, proposed: &[String]) -> ValidationOutcome {
        let mut accepted = Vec::new();
        let mut demoted = Vec::new();
        for term in proposed {
            if self.is_valid(kind, term) {
                accepted.push(term.clone());
            } else {
                demoted.push(term.clone());
            }
        }
        ValidationOutcome { accepted, demoted }
    }

    /// Append a suggestion to the in-memory log and, if configured, persist
    /// it to the on-disk suggestions file.
    pub async fn record_suggestion(
        &self,
        kind: VocabKind,
        term: impl Into<String>,
        source_doc_id: impl Into<String>,
        context: Option<String>,
        ts: DateTime<Utc>,
    ) -> Result<(), RagError> {
        let suggestion = Suggestion {
            kind,
            term: term.into(),
            source_doc_id: source_doc_id.into(),
            ts,
            context,
        };
        if let Some(path) = &self.suggestions_log_path {
            let line = serde_json::to_string(&suggestion)?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            use tokio::io::AsyncWriteExt;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        self.suggestions.lock().await.push(suggestion);
        Ok(())
    }

    /// Snapshot of all suggestions recorded this process lifetime.
    pub async fn suggestions(&self) -> Vec<Suggestion> {
        self.suggestions.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_splits_known_and_unknown_terms() {
        let mut store = VocabularyStore::empty();
        store.insert(VocabKind::Topic, "technology/ai");
        store.insert(VocabKind::Topic, "technology/machine-learning");

        let outcome = store.validate(
            VocabKind::Topic,
            &[
                "technology/ai".to_string(),
                "technology/neural-networks".to_string(),
            ],
        );
        assert_eq!(outcome.accepted, vec!["technology/ai".to_string()]);
        assert_eq!(
            outcome.demoted,
            vec!["technology/neural-networks".to_string()]
        );
    }

    #[test]
    fn hierarchical_paths_are_exact_match_only() {
        let mut store = VocabularyStore::empty();
        store.insert(VocabKind::Topic, "technology/ai");
        assert!(!store.is_valid(VocabKind::Topic, "technology"));
        assert!(!store.is_valid(VocabKind::Topic, "ai"));
        assert!(store.is_valid(VocabKind::Topic, "technology/ai"));
    }

    #[tokio::test]
    async fn record_suggestion_persists_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("suggestions.jsonl");
        let store = VocabularyStore {
            sets: Default::default(),
            ordered: Default::default(),
            suggestions_log_path: Some(log_path.clone()),
            suggestions: Arc::new(Mutex::new(Vec::new())),
        };
        store
            .record_suggestion(
                VocabKind::Topic,
                "technology/neural-networks",
                "doc-1",
                None,
                Utc::now(),
            )
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert!(contents.contains("neural-networks"));
        assert_eq!(store.suggestions().await.len(), 1);
    }
}
