//! Data types for documents, chunks, search results and answers.

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata attached to documents and chunks.
pub type Metadata = HashMap<String, Value>;

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: Metadata,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with empty metadata and no source URI.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Metadata::new(), source_uri: None }
    }

    /// Build a document from raw fetched bytes.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected; format
    /// specific extraction happens before this point.
    pub fn from_bytes(id: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(id, String::from_utf8_lossy(bytes).into_owned())
    }

    /// Set the source URI.
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A bounded span of a [`Document`] treated as one retrievable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Character (not byte) offsets of this chunk in the parent document.
    pub source_offset: Range<usize>,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    #[serde(default)]
    pub metadata: Metadata,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk in the document's chunk sequence.
    pub index: usize,
}

impl Chunk {
    /// Number of characters covered by this chunk.
    pub fn char_len(&self) -> usize {
        self.source_offset.end - self.source_offset.start
    }
}

/// A [`Chunk`] paired with its embedding vector and a store-level identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    /// Opaque identifier assigned at embedding time.
    pub id: String,
    /// The chunk this vector was computed from.
    pub chunk: Chunk,
    /// The embedding vector.
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    /// Pair a chunk with its vector under a freshly generated identifier.
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), chunk, vector }
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score between the chunk and the query (higher is more relevant).
    pub score: f32,
}

/// A stored record returned by a backend query, with its vector.
///
/// Backends return the stored vector so that MMR can compare candidates
/// with each other, not only with the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    /// The stored record.
    pub record: EmbeddedChunk,
    /// Similarity between the record and the query vector.
    pub score: f32,
}

impl From<ScoredRecord> for SearchResult {
    fn from(scored: ScoredRecord) -> Self {
        SearchResult { chunk: scored.record.chunk, score: scored.score }
    }
}

/// The result of answering one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagAnswer {
    /// The question as asked.
    pub question: String,
    /// The chunks passed to the model, in retrieval order.
    pub context_used: Vec<Chunk>,
    /// The plain-text answer extracted from the model response.
    pub answer: String,
}
