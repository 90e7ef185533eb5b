//! Structure-aware splitting.
//!
//! Boundaries are honored in priority order: `RAG:IGNORE` exclusion,
//! headings, fenced code/tables (never split), lists (grouped unless
//! oversized), then paragraph-packed prose with a sentence-boundary
//! tiebreak. Chat exports split on speaker turns instead.

use regex::Regex;
use std::sync::LazyLock;

use crate::document::{DocType, Document};
use crate::error::RagError;

use super::types::{Chunk, ChunkType, estimate_tokens};

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").unwrap());
static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)([-*+]|\d+\.)\s+").unwrap());
static TABLE_ROW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\|.*\|\s*$").unwrap());
static CHAT_SPEAKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9 _.'-]{1,40}):\s").unwrap());
static SENTENCE_BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:[.!?])\s+").unwrap());

const IGNORE_OPEN: &str = "<!-- RAG:IGNORE -->";
const IGNORE_CLOSE: &str = "<!-- /RAG:IGNORE -->";

/// Configuration for the chunker (subset of [`crate::config::RagConfig`]).
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub target_tokens: usize,
    pub max_tokens: usize,
}

/// A raw, untyped line grouping used internally before chunk assembly.
enum Block {
    Heading { level: usize, title: String },
    Code(String),
    Table(String),
    List(String),
    Paragraph(String),
}

/// Structure-aware chunker.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split `doc`'s raw text into contiguous, zero-indexed chunks.
    pub fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>, RagError> {
        let stripped = strip_ignore_blocks(&doc.raw_text);

        if doc.doc_type == DocType::Chat {
            return Ok(self.chunk_chat(&stripped, &doc.short_id));
        }

        let blocks = parse_blocks(&stripped);
        Ok(self.assemble(blocks, &doc.short_id))
    }

    fn chunk_chat(&self, text: &str, doc_short_id: &str) -> Vec<Chunk> {
        let mut turns: Vec<(Option<String>, String)> = Vec::new();
        for line in text.lines() {
            if let Some(caps) = CHAT_SPEAKER_RE.captures(line) {
                let speaker = caps[1].trim().to_string();
                let rest = line[caps.get(0).unwrap().end()..].to_string();
                turns.push((Some(speaker), rest));
            } else if let Some((_, buf)) = turns.last_mut() {
                if !buf.is_empty() {
                    buf.push('\n');
                }
                buf.push_str(line);
            } else {
                turns.push((None, line.to_string()));
            }
        }

        turns
            .into_iter()
            .enumerate()
            .filter(|(_, (_, body))| !body.trim().is_empty())
            .map(|(sequence, (speaker, body))| {
                let text = body.trim().to_string();
                Chunk {
                    chunk_id: Chunk::chunk_id_for(doc_short_id, sequence),
                    token_estimate: estimate_tokens(&text),
                    text,
                    sequence,
                    chunk_type: ChunkType::ChatTurn,
                    section_title: None,
                    parent_sections: Vec::new(),
                    speaker,
                }
            })
            .collect()
    }

    fn assemble(&self, blocks: Vec<Block>, doc_short_id: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut sequence = 0usize;
        let mut section_stack: Vec<(usize, String)> = Vec::new();
        let mut pending_heading: Option<String> = None;
        let mut prose_buffer: Vec<String> = Vec::new();

        let flush_prose =
            |prose_buffer: &mut Vec<String>,
             pending_heading: &mut Option<String>,
             section_stack: &[(usize, String)],
             sequence: &mut usize,
             chunks: &mut Vec<Chunk>| {
                if prose_buffer.is_empty() {
                    return;
                }
                let paragraphs = std::mem::take(prose_buffer);
                for packed in pack_paragraphs(&paragraphs, self.config.target_tokens, self.config.max_tokens) {
                    push_chunk(
                        chunks,
                        sequence,
                        doc_short_id,
                        ChunkType::Paragraph,
                        packed,
                        pending_heading,
                        section_stack,
                    );
                }
            };

        for block in blocks {
            match block {
                Block::Heading { level, title } => {
                    flush_prose(
                        &mut prose_buffer,
                        &mut pending_heading,
                        &section_stack,
                        &mut sequence,
                        &mut chunks,
                    );
                    while section_stack.last().is_some_and(|(l, _)| *l >= level) {
                        section_stack.pop();
                    }
                    section_stack.push((level, title.clone()));
                    pending_heading = Some(format!("{} {}", "#".repeat(level), title));
                }
                Block::Code(text) => {
                    flush_prose(
                        &mut prose_buffer,
                        &mut pending_heading,
                        &section_stack,
                        &mut sequence,
                        &mut chunks,
                    );
                    push_chunk(
                        &mut chunks,
                        &mut sequence,
                        doc_short_id,
                        ChunkType::Code,
                        text,
                        &mut pending_heading,
                        &section_stack,
                    );
                }
                Block::Table(text) => {
                    flush_prose(
                        &mut prose_buffer,
                        &mut pending_heading,
                        &section_stack,
                        &mut sequence,
                        &mut chunks,
                    );
                    push_chunk(
                        &mut chunks,
                        &mut sequence,
                        doc_short_id,
                        ChunkType::Table,
                        text,
                        &mut pending_heading,
                        &section_stack,
                    );
                }
                Block::List(text) => {
                    flush_prose(
                        &mut prose_buffer,
                        &mut pending_heading,
                        &section_stack,
                        &mut sequence,
                        &mut chunks,
                    );
                    if estimate_tokens(&text) <= self.config.max_tokens {
                        push_chunk(
                            &mut chunks,
                            &mut sequence,
                            doc_short_id,
                            ChunkType::List,
                            text,
                            &mut pending_heading,
                            &section_stack,
                        );
                    } else {
                        for part in split_oversized_list(&text, self.config.max_tokens) {
                            push_chunk(
                                &mut chunks,
                                &mut sequence,
                                doc_short_id,
                                ChunkType::List,
                                part,
                                &mut pending_heading,
                                &section_stack,
                            );
                        }
                    }
                }
                Block::Paragraph(text) => prose_buffer.push(text),
            }
        }
        flush_prose(
            &mut prose_buffer,
            &mut pending_heading,
            &section_stack,
            &mut sequence,
            &mut chunks,
        );

        if let Some(heading) = pending_heading {
            push_chunk(
                &mut chunks,
                &mut sequence,
                doc_short_id,
                ChunkType::Heading,
                heading,
                &mut None,
                &section_stack,
            );
        }

        chunks
    }
}

fn push_chunk(
    chunks: &mut Vec<Chunk>,
    sequence: &mut usize,
    doc_short_id: &str,
    chunk_type: ChunkType,
    body: String,
    pending_heading: &mut Option<String>,
    section_stack: &[(usize, String)],
) {
    let text = match pending_heading.take() {
        Some(heading) => format!("{heading}\n\n{body}"),
        None => body,
    };
    let section_title = section_stack.last().map(|(_, t)| t.clone());
    let parent_sections = section_stack.iter().map(|(_, t)| t.clone()).collect();
    chunks.push(Chunk {
        chunk_id: Chunk::chunk_id_for(doc_short_id, *sequence),
        token_estimate: estimate_tokens(&text),
        text,
        sequence: *sequence,
        chunk_type,
        section_title,
        parent_sections,
        speaker: None,
    });
    *sequence += 1;
}

/// Greedily pack paragraphs to `target_tokens`, never exceeding `max_tokens`
/// for a single chunk; paragraphs individually over `max_tokens` are split
/// on sentence boundaries.
fn pack_paragraphs(paragraphs: &[String], target_tokens: usize, max_tokens: usize) -> Vec<String> {
    let mut packed = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    let flush = |current: &mut String, current_tokens: &mut usize, packed: &mut Vec<String>| {
        if !current.is_empty() {
            packed.push(std::mem::take(current));
            *current_tokens = 0;
        }
    };

    for paragraph in paragraphs {
        let paragraph_tokens = estimate_tokens(paragraph);
        if paragraph_tokens > max_tokens {
            flush(&mut current, &mut current_tokens, &mut packed);
            packed.extend(split_on_sentences(paragraph, max_tokens));
            continue;
        }
        if current_tokens + paragraph_tokens > max_tokens
            || (current_tokens >= target_tokens && current_tokens + paragraph_tokens > target_tokens)
        {
            flush(&mut current, &mut current_tokens, &mut packed);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
        current_tokens += paragraph_tokens;
    }
    flush(&mut current, &mut current_tokens, &mut packed);
    packed
}

fn split_on_sentences(paragraph: &str, max_tokens: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;
    let mut last = 0;
    for m in SENTENCE_BOUNDARY_RE.find_iter(paragraph) {
        let sentence = &paragraph[last..m.end()];
        last = m.end();
        append_unit(sentence, max_tokens, &mut out, &mut current, &mut current_tokens);
    }
    let tail = &paragraph[last..];
    if !tail.trim().is_empty() {
        append_unit(tail, max_tokens, &mut out, &mut current, &mut current_tokens);
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

/// Append one sentence (or the trailing remainder) to the in-progress chunk,
/// flushing first if it would overflow `max_tokens`. A unit that exceeds
/// `max_tokens` on its own (no sentence-ending punctuation within range)
/// falls back to a word-level split instead of becoming one oversized chunk.
fn append_unit(unit: &str, max_tokens: usize, out: &mut Vec<String>, current: &mut String, current_tokens: &mut usize) {
    let unit_tokens = estimate_tokens(unit);
    if unit_tokens > max_tokens {
        if !current.is_empty() {
            out.push(std::mem::take(current));
            *current_tokens = 0;
        }
        out.extend(split_on_words(unit, max_tokens));
        return;
    }
    if *current_tokens + unit_tokens > max_tokens && !current.is_empty() {
        out.push(std::mem::take(current));
        *current_tokens = 0;
    }
    current.push_str(unit);
    *current_tokens += unit_tokens;
}

/// Greedily pack whitespace-delimited words up to `max_tokens`, for text with
/// no sentence boundary to split on.
fn split_on_words(text: &str, max_tokens: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;
    for word in text.split_whitespace() {
        let word_tokens = estimate_tokens(word).max(1);
        if current_tokens + word_tokens > max_tokens && !current.is_empty() {
            out.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        current_tokens += word_tokens;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn split_oversized_list(text: &str, max_tokens: usize) -> Vec<String> {
    let items: Vec<&str> = text.split("\n\n").collect();
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;
    for item in items {
        let item_tokens = estimate_tokens(item);
        if current_tokens + item_tokens > max_tokens && !current.is_empty() {
            out.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(item);
        current_tokens += item_tokens;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn strip_ignore_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = rest.find(IGNORE_OPEN) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start + IGNORE_OPEN.len()..];
        match after_open.find(IGNORE_CLOSE) {
            Some(end) => rest = &after_open[end + IGNORE_CLOSE.len()..],
            None => break,
        }
    }
    out
}

fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0usize;
    let mut paragraph_buf: Vec<&str> = Vec::new();

    let flush_paragraph = |buf: &mut Vec<&str>, blocks: &mut Vec<Block>| {
        if !buf.is_empty() {
            blocks.push(Block::Paragraph(buf.join("\n")));
            buf.clear();
        }
    };

    while i < lines.len() {
        let line = lines[i];

        if line.trim().is_empty() {
            flush_paragraph(&mut paragraph_buf, &mut blocks);
            i += 1;
            continue;
        }

        if let Some(caps) = HEADING_RE.captures(line) {
            flush_paragraph(&mut paragraph_buf, &mut blocks);
            blocks.push(Block::Heading {
                level: caps[1].len(),
                title: caps[2].trim().to_string(),
            });
            i += 1;
            continue;
        }

        if line.trim_start().starts_with("```") {
            flush_paragraph(&mut paragraph_buf, &mut blocks);
            let fence = line.trim_start()[..3].to_string();
            let mut code_lines = vec![line];
            i += 1;
            while i < lines.len() && !lines[i].trim_start().starts_with(&fence) {
                code_lines.push(lines[i]);
                i += 1;
            }
            if i < lines.len() {
                code_lines.push(lines[i]);
                i += 1;
            }
            blocks.push(Block::Code(code_lines.join("\n")));
            continue;
        }

        if TABLE_ROW_RE.is_match(line) {
            flush_paragraph(&mut paragraph_buf, &mut blocks);
            let mut table_lines = vec![line];
            i += 1;
            while i < lines.len() && TABLE_ROW_RE.is_match(lines[i]) {
                table_lines.push(lines[i]);
                i += 1;
            }
            blocks.push(Block::Table(table_lines.join("\n")));
            continue;
        }

        if LIST_ITEM_RE.is_match(line) {
            flush_paragraph(&mut paragraph_buf, &mut blocks);
            let mut list_lines = vec![line];
            i += 1;
            while i < lines.len()
                && !lines[i].trim().is_empty()
                && (LIST_ITEM_RE.is_match(lines[i]) || lines[i].starts_with(' ') || lines[i].starts_with('\t'))
            {
                list_lines.push(lines[i]);
                i += 1;
            }
            blocks.push(Block::List(list_lines.join("\n")));
            continue;
        }

        paragraph_buf.push(line);
        i += 1;
    }
    flush_paragraph(&mut paragraph_buf, &mut blocks);
    blocks
}
