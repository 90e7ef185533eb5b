//! Chunk data model.

use serde::{Deserialize, Serialize};

/// The structural role a chunk plays in its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Heading,
    Paragraph,
    List,
    Table,
    Code,
    ChatTurn,
}

/// The minimal retrievable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// `{doc_short_id}_chunk_{sequence}`.
    pub chunk_id: String,
    pub text: String,
    /// 0-indexed, contiguous per document.
    pub sequence: usize,
    pub chunk_type: ChunkType,
    /// Nearest enclosing heading, if any.
    pub section_title: Option<String>,
    /// Ordered path of enclosing headings, root first.
    pub parent_sections: Vec<String>,
    /// `words * 1.3`, the project's standard token-count heuristic.
    pub token_estimate: usize,
    /// Present only for `ChunkType::ChatTurn` chunks.
    pub speaker: Option<String>,
}

impl Chunk {
    #[must_use]
    pub fn chunk_id_for(doc_short_id: &str, sequence: usize) -> String {
        format!("{doc_short_id}_chunk_{sequence}")
    }
}

/// Words × 1.3 token-estimate heuristic shared by the chunker and the RAG
/// confidence computation.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    ((words as f64) * 1.3).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_format() {
        assert_eq!(Chunk::chunk_id_for("abc123def456", 3), "abc123def456_chunk_3");
    }

    #[test]
    fn token_estimate_scales_with_word_count() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three four five"), 7);
    }
}
