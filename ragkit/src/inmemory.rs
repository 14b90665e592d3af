//! In-memory vector store with exhaustive similarity search.
//!
//! This module provides [`InMemoryVectorStore`], a zero-dependency vector store
//! backed by a `Vec` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small-scale use cases.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{EmbeddedChunk, ScoredRecord};
use crate::error::{RagError, Result};
use crate::index::{IndexDefinition, IndexState, IndexStatus};
use crate::vectorstore::{VectorQuery, VectorStore};

const BACKEND: &str = "InMemory";

/// An in-memory vector store for a single collection.
///
/// Records keep insertion order, which is also the tie-break order for equal
/// scores. Declared indexes go through the same lifecycle as a remote
/// backend: each [`index_status`](VectorStore::index_status) call advances
/// the build by one step, and a build fails if any stored vector does not
/// match the declared dimension.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new("docs").with_build_polls(3);
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    collection: String,
    build_polls: u32,
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<EmbeddedChunk>,
    indexes: HashMap<String, IndexEntry>,
}

#[derive(Debug)]
struct IndexEntry {
    definition: IndexDefinition,
    state: IndexState,
    polls_remaining: u32,
    detail: Option<String>,
}

impl IndexEntry {
    fn advance(&mut self, next: IndexState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        }
    }
}

impl InMemoryVectorStore {
    /// Create an empty store for the named collection.
    ///
    /// Indexes become ready on their first status poll.
    pub fn new(collection: impl Into<String>) -> Self {
        Self { collection: collection.into(), build_polls: 0, inner: RwLock::new(Inner::default()) }
    }

    /// Report `Building` for this many status polls before an index is ready.
    pub fn with_build_polls(mut self, polls: u32) -> Self {
        self.build_polls = polls;
        self
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn insert_all(&self, records: &[EmbeddedChunk]) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.records.extend_from_slice(records);
        debug!(
            collection = %self.collection,
            count = records.len(),
            total = inner.records.len(),
            "inserted records"
        );
        Ok(())
    }

    async fn create_index(&self, definition: &IndexDefinition) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.indexes.contains_key(&definition.name) {
            return Err(RagError::IndexAlreadyExists {
                collection: self.collection.clone(),
                index: definition.name.clone(),
            });
        }
        inner.indexes.insert(
            definition.name.clone(),
            IndexEntry {
                definition: definition.clone(),
                state: IndexState::Creating,
                polls_remaining: self.build_polls,
                detail: None,
            },
        );
        Ok(())
    }

    async fn index_status(&self, name: &str) -> Result<Option<IndexStatus>> {
        let mut guard = self.inner.write().await;
        let Inner { records, indexes } = &mut *guard;
        let Some(entry) = indexes.get_mut(name) else {
            return Ok(None);
        };

        if entry.state == IndexState::Creating {
            entry.advance(IndexState::Building);
        }
        if entry.state == IndexState::Building {
            if entry.polls_remaining > 0 {
                entry.polls_remaining -= 1;
            } else if let Some(bad) =
                records.iter().find(|r| r.vector.len() != entry.definition.dimension)
            {
                entry.detail = Some(format!(
                    "record '{}' has dimension {}, index '{}' expects {}",
                    bad.id,
                    bad.vector.len(),
                    entry.definition.name,
                    entry.definition.dimension
                ));
                entry.advance(IndexState::Failed);
            } else {
                entry.advance(IndexState::Ready);
            }
        }

        Ok(Some(IndexStatus { state: entry.state, detail: entry.detail.clone() }))
    }

    async fn search(&self, query: VectorQuery<'_>) -> Result<Vec<ScoredRecord>> {
        let inner = self.inner.read().await;
        let entry = inner.indexes.get(query.index).ok_or_else(|| RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!("index '{}' does not exist on '{}'", query.index, self.collection),
        })?;
        if entry.state != IndexState::Ready {
            return Err(RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: format!("index '{}' is {}, not READY", query.index, entry.state),
            });
        }
        if query.vector.len() != entry.definition.dimension {
            return Err(RagError::DimensionMismatch {
                expected: entry.definition.dimension,
                actual: query.vector.len(),
            });
        }

        let metric = entry.definition.similarity;
        let mut scored: Vec<ScoredRecord> = inner
            .records
            .iter()
            .filter(|r| query.filter.is_none_or(|f| f.matches(&r.chunk.metadata)))
            .map(|r| ScoredRecord {
                score: metric.similarity(query.vector, &r.vector),
                record: r.clone(),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.limit);
        Ok(scored)
    }
}
