//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`SectionChunker`], which
//! splits normalised text into heading-delimited sections, packs oversized
//! sections sentence by sentence with a character overlap, merges undersized
//! chunks forward, and scores every chunk with a quality gate.
//!
//! All sizes are measured in characters. Chunk spans are byte offsets into the
//! text returned by [`normalize_text`].

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use crate::config::ChunkingConfig;
use crate::document::{Chunk, Document};
use crate::error::Result;

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document text is empty or whitespace.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n(?:[ \t]*\n){2,}").expect("unreachable error: invalid newline pattern")
});

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?]+["'”’)\]]*\s+|\n\n+"#)
        .expect("unreachable error: invalid sentence pattern")
});

static MARKDOWN_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#{1,6}\s+(\S.*)$").expect("unreachable error: invalid markdown heading pattern")
});

static SECTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:chapter|section|part|article|appendix)\s+[\w.]+")
        .expect("unreachable error: invalid section marker pattern")
});

static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(?:\.\d+)*\.?\s+\p{Lu}").expect("unreachable error: invalid numbered pattern")
});

/// Unify line endings, collapse runs of three or more newlines into a single
/// blank line, and trim the ends.
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    EXCESS_NEWLINES.replace_all(&unified, "\n\n").trim().to_string()
}

/// Return the heading text if `line` looks like a heading.
///
/// Recognises markdown headings, explicit section markers (`Chapter 3`,
/// `Section 2.1`), numbered headings (`2.3 Results`), and short all-caps lines.
pub fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 100 {
        return None;
    }
    if let Some(caps) = MARKDOWN_HEADING.captures(trimmed) {
        return Some(caps[1].trim().to_string());
    }
    if SECTION_MARKER.is_match(trimmed) {
        return Some(trimmed.to_string());
    }
    let unterminated = !trimmed.ends_with(['.', ',', ';', ':']);
    if NUMBERED_HEADING.is_match(trimmed) && unterminated && trimmed.chars().count() <= 80 {
        return Some(trimmed.to_string());
    }
    let letters: Vec<char> = trimmed.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 3
        && letters.iter().all(|c| c.is_uppercase())
        && unterminated
        && trimmed.chars().count() <= 80
    {
        return Some(trimmed.to_string());
    }
    None
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset `n` characters after `from`, clamped to the end of `text`.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..].char_indices().nth(n).map_or(text.len(), |(i, _)| from + i)
}

/// Byte offset `n` characters before `from`, clamped to the start of `text`.
fn retreat_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from].char_indices().rev().nth(n - 1).map_or(0, |(i, _)| i)
}

#[derive(Debug, Clone)]
struct Section {
    start: usize,
    end: usize,
    title: Option<String>,
}

#[derive(Debug, Clone)]
struct Span {
    start: usize,
    end: usize,
    section_title: Option<String>,
}

/// Splits text along headings and sentences with a character overlap.
///
/// Chunk IDs are generated as `{document_id}_{index}`. Each chunk inherits
/// the parent document's domain tags and metadata plus a `chunk_index` field.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{ChunkingConfig, SectionChunker};
///
/// let chunker = SectionChunker::new(ChunkingConfig::default())?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct SectionChunker {
    config: ChunkingConfig,
}

impl SectionChunker {
    /// Create a chunker with the given sizing parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`](crate::RagError::Config) when the sizes fail
    /// [`ChunkingConfig::validate`].
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Shorthand for a chunker with the given maximum size and overlap and
    /// the default minimum size (capped at `max_chunk_size`).
    pub fn with_sizes(max_chunk_size: usize, overlap_size: usize) -> Result<Self> {
        let min_chunk_size = ChunkingConfig::default().min_chunk_size.min(max_chunk_size);
        Self::new(ChunkingConfig { max_chunk_size, overlap_size, min_chunk_size })
    }

    /// The sizing parameters of this chunker.
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Heuristic confidence for a chunk's text.
    ///
    /// Starts at `1.0`, subtracts `0.3` below the minimum size and `0.2` when
    /// more than half the characters are whitespace, adds `0.1` for text with
    /// terminal punctuation and more than one word, then clamps to `[0, 1]`.
    pub fn quality_score(&self, text: &str) -> f32 {
        let len = char_count(text);
        let mut score: f32 = 1.0;
        if len < self.config.min_chunk_size {
            score -= 0.3;
        }
        if len > 0 {
            let whitespace = text.chars().filter(|c| c.is_whitespace()).count();
            if whitespace as f32 / len as f32 > 0.5 {
                score -= 0.2;
            }
        }
        if text.contains(['.', '!', '?']) && text.split_whitespace().nth(1).is_some() {
            score += 0.1;
        }
        score.clamp(0.0, 1.0)
    }

    fn sections(text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut current = Section { start: 0, end: 0, title: None };
        let mut has_content = false;
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            if let Some(title) = heading_text(line) {
                if has_content {
                    current.end = offset;
                    sections.push(current);
                    current = Section { start: offset, end: 0, title: Some(title) };
                    has_content = false;
                } else if current.title.is_none() {
                    current.title = Some(title);
                }
            } else if !line.trim().is_empty() {
                has_content = true;
            }
            offset += line.len();
        }

        current.end = text.len();
        if current.end > current.start {
            sections.push(current);
        }
        sections
    }

    fn split_section(&self, text: &str, section: &Section, spans: &mut Vec<Span>) {
        let max = self.config.max_chunk_size;
        let overlap = self.config.overlap_size;
        let boundaries: Vec<usize> = SENTENCE_END
            .find_iter(&text[section.start..section.end])
            .map(|m| section.start + m.end())
            .collect();

        let mut start = section.start;
        // Bytes before `content_from` were seeded from the previous chunk.
        let mut content_from = section.start;
        loop {
            if char_count(&text[start..section.end]) <= max {
                spans.push(Span {
                    start,
                    end: section.end,
                    section_title: section.title.clone(),
                });
                return;
            }

            let limit = advance_chars(text, start, max);
            let end = boundaries
                .iter()
                .rev()
                .copied()
                .find(|&b| b > content_from && b <= limit)
                .unwrap_or(limit);
            spans.push(Span { start, end, section_title: section.title.clone() });

            content_from = end;
            start = retreat_chars(text, end, overlap).max(start);
        }
    }

    fn merge_small(&self, text: &str, spans: Vec<Span>) -> Vec<Span> {
        let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
        let mut iter = spans.into_iter();
        let Some(mut current) = iter.next() else {
            return merged;
        };

        for next in iter {
            let too_small = char_count(&text[current.start..current.end]) < self.config.min_chunk_size;
            let fits = char_count(&text[current.start..next.end]) <= self.config.max_chunk_size;
            if too_small && fits {
                current.end = next.end;
                if current.section_title.is_none() {
                    current.section_title = next.section_title;
                }
            } else {
                merged.push(current);
                current = next;
            }
        }
        merged.push(current);
        merged
    }

    fn build_chunk(&self, document: &Document, text: &str, index: usize, span: Span) -> Chunk {
        let chunk_text = text[span.start..span.end].to_string();
        let section_title = chunk_text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(3)
            .find_map(heading_text)
            .or(span.section_title);

        let mut metadata = document.metadata.clone();
        metadata.insert("chunk_index".to_string(), index.to_string());
        metadata.insert("language".to_string(), document.language.clone());

        Chunk {
            id: format!("{}_{index}", document.id),
            document_id: document.id.clone(),
            index,
            token_count: char_count(&chunk_text) / 4,
            confidence: self.quality_score(&chunk_text),
            page: page_at(text, span.start),
            content_type: Some(content_type(&chunk_text).to_string()),
            section_title,
            text: chunk_text,
            start: span.start,
            end: span.end,
            embedding: Vec::new(),
            embedding_degraded: false,
            domain_tags: document.domain_tags.clone(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

impl Default for SectionChunker {
    fn default() -> Self {
        Self { config: ChunkingConfig::default() }
    }
}

impl Chunker for SectionChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = normalize_text(&document.text);
        if text.is_empty() {
            return Vec::new();
        }

        let mut spans = Vec::new();
        for section in Self::sections(&text) {
            self.split_section(&text, &section, &mut spans);
        }
        let spans = self.merge_small(&text, spans);

        spans
            .into_iter()
            .enumerate()
            .map(|(index, span)| self.build_chunk(document, &text, index, span))
            .collect()
    }
}

/// One-based page number derived from form-feed page breaks, if the text has any.
fn page_at(text: &str, offset: usize) -> Option<u32> {
    if !text.contains('\u{c}') {
        return None;
    }
    let breaks = text[..offset].matches('\u{c}').count();
    u32::try_from(breaks + 1).ok()
}

/// Coarse label for the shape of a chunk's content.
fn content_type(text: &str) -> &'static str {
    if text.contains("```") {
        return "code";
    }
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return "text";
    }
    let majority = |count: usize| count * 2 > lines.len();
    let table_rows = lines.iter().filter(|l| l.matches('|').count() >= 2).count();
    if majority(table_rows) {
        return "table";
    }
    let list_items = lines
        .iter()
        .filter(|l| {
            l.starts_with("- ")
                || l.starts_with("* ")
                || l.starts_with("• ")
                || l.split_once(". ").is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .count();
    if majority(list_items) {
        return "list";
    }
    "text"
}
