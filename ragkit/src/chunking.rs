//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`]: sliding window that prefers paragraph, sentence, then word boundaries
//! - [`FixedSizeChunker`]: sliding window with hard character cuts
//!
//! Both walk the text with a window of at most `chunk_size` characters. The next
//! window always starts exactly `chunk_overlap` characters before the previous
//! window ended, so consecutive chunks overlap by exactly `chunk_overlap`
//! characters no matter where a boundary was found, and the original text can
//! be rebuilt from the chunks' offsets.

use std::ops::Range;

use serde_json::Value;

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text, offsets, and metadata.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Split a document with the boundary-preferring policy of [`RecursiveChunker`].
///
/// # Errors
///
/// Returns [`RagError::InvalidConfig`] if `chunk_size == 0` or
/// `chunk_overlap >= chunk_size`.
pub fn split(document: &Document, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<Chunk>> {
    Ok(RecursiveChunker::new(chunk_size, chunk_overlap)?.chunk(document))
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidConfig("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidConfig(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// Splits text into fixed-size character windows with configurable overlap.
///
/// Every chunk except the last is exactly `chunk_size` characters long.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = CharText::new(&document.text);
        let spans = window_spans(&text.chars, self.chunk_size, self.chunk_overlap, false);
        build_chunks(document, &text, spans)
    }
}

/// Splits text with a sliding window that ends on natural boundaries when it can.
///
/// Inside each window the chunker looks for the last paragraph break (`\n\n`),
/// then the last sentence end (`. `, `! `, `? `, or a line break), then the
/// last whitespace. If none lies in the second half of the window's stride it
/// falls back to a hard cut at `chunk_size` characters. Separators stay
/// attached to the chunk they terminate.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(200, 20)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = CharText::new(&document.text);
        let spans = window_spans(&text.chars, self.chunk_size, self.chunk_overlap, true);
        build_chunks(document, &text, spans)
    }
}

/// Text viewed as chars, with the byte position of every char boundary.
struct CharText<'a> {
    text: &'a str,
    chars: Vec<char>,
    /// `byte_offsets[i]` is the byte index of char `i`; the last entry is `text.len()`.
    byte_offsets: Vec<usize>,
}

impl<'a> CharText<'a> {
    fn new(text: &'a str) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut byte_offsets = Vec::with_capacity(text.len() + 1);
        for (pos, ch) in text.char_indices() {
            chars.push(ch);
            byte_offsets.push(pos);
        }
        byte_offsets.push(text.len());
        Self { text, chars, byte_offsets }
    }

    fn slice(&self, span: &Range<usize>) -> &'a str {
        &self.text[self.byte_offsets[span.start]..self.byte_offsets[span.end]]
    }
}

/// Compute the character spans of each window.
fn window_spans(
    chars: &[char],
    chunk_size: usize,
    chunk_overlap: usize,
    prefer_boundaries: bool,
) -> Vec<Range<usize>> {
    let len = chars.len();
    let mut spans = Vec::new();
    if len == 0 {
        return spans;
    }

    let stride = chunk_size - chunk_overlap;
    let mut start = 0;

    loop {
        let hard_end = (start + chunk_size).min(len);
        if hard_end == len {
            spans.push(start..len);
            break;
        }

        let end = if prefer_boundaries {
            // Anything earlier would make the next window start at or before this one.
            let min_end = start + chunk_overlap + (stride / 2).max(1);
            find_boundary(chars, min_end, hard_end).unwrap_or(hard_end)
        } else {
            hard_end
        };

        spans.push(start..end);
        start = end - chunk_overlap;
    }

    spans
}

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

impl Boundary {
    const PRIORITY: [Boundary; 3] = [Boundary::Paragraph, Boundary::Sentence, Boundary::Word];

    /// Whether a chunk ending just before char `end` ends on this boundary.
    fn ends_at(self, chars: &[char], end: usize) -> bool {
        let last = chars[end - 1];
        let before = end.checked_sub(2).map(|i| chars[i]);
        match self {
            Boundary::Paragraph => last == '\n' && before == Some('\n'),
            Boundary::Sentence => {
                last == '\n'
                    || (last.is_whitespace() && matches!(before, Some('.' | '!' | '?')))
            }
            Boundary::Word => last.is_whitespace(),
        }
    }
}

/// Find the latest end position in `min_end..=max_end` on the best available boundary.
fn find_boundary(chars: &[char], min_end: usize, max_end: usize) -> Option<usize> {
    if min_end > max_end {
        return None;
    }
    Boundary::PRIORITY
        .iter()
        .find_map(|boundary| (min_end..=max_end).rev().find(|&end| boundary.ends_at(chars, end)))
}

fn build_chunks(document: &Document, text: &CharText<'_>, spans: Vec<Range<usize>>) -> Vec<Chunk> {
    spans
        .into_iter()
        .enumerate()
        .map(|(index, span)| {
            let mut metadata = document.metadata.clone();
            metadata.insert("chunk_index".to_string(), Value::from(index));
            if let Some(uri) = &document.source_uri {
                metadata.insert("source".to_string(), Value::from(uri.as_str()));
            }
            Chunk {
                text: text.slice(&span).to_string(),
                source_offset: span,
                metadata,
                document_id: document.id.clone(),
                index,
            }
        })
        .collect()
}
