//! Vector index declaration, lifecycle, and retrieval.
//!
//! A [`VectorIndex`] binds an [`IndexDefinition`] to a [`VectorStore`] and an
//! [`EmbeddingProvider`]. It is the handle returned by ingestion and the
//! surface both retrieval algorithms run against:
//!
//! - [`VectorIndex::similarity_search`]: top-k by raw similarity
//! - [`VectorIndex::max_marginal_relevance_search`]: top-k re-selected for diversity
//!
//! Index lifecycle: `Creating → Building → Ready`, with `Failed` reachable from
//! `Building`. `Ready` and `Failed` are terminal.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::document::{EmbeddedChunk, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::mmr;
use crate::similarity::SimilarityMetric;
use crate::sync::{self, SyncConfig};
use crate::vectorstore::{VectorQuery, VectorStore};

/// Declaration of an ANN index over a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexDefinition {
    /// Index name, unique per collection.
    pub name: String,
    /// Field holding the embedding vector.
    pub vector_field: String,
    /// Field holding the chunk text.
    pub text_field: String,
    /// Vector dimension; must match the embedding provider.
    pub dimension: usize,
    /// Similarity function used for ranking.
    pub similarity: SimilarityMetric,
    /// Metadata fields declared as filterable.
    pub filter_fields: Vec<String>,
}

impl Default for IndexDefinition {
    fn default() -> Self {
        Self {
            name: "vector_index".to_string(),
            vector_field: "embedding".to_string(),
            text_field: "text".to_string(),
            dimension: 1536,
            similarity: SimilarityMetric::Cosine,
            filter_fields: Vec::new(),
        }
    }
}

impl IndexDefinition {
    /// Create a cosine index with default field names.
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self { name: name.into(), dimension, ..Self::default() }
    }

    /// Set the similarity metric.
    pub fn with_similarity(mut self, similarity: SimilarityMetric) -> Self {
        self.similarity = similarity;
        self
    }

    /// Declare a metadata field as filterable.
    pub fn with_filter_field(mut self, field: impl Into<String>) -> Self {
        self.filter_fields.push(field.into());
        self
    }

    /// Check the declaration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] for an empty name or field, or a zero dimension.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RagError::InvalidConfig("index name must not be empty".into()));
        }
        if self.vector_field.is_empty() || self.text_field.is_empty() {
            return Err(RagError::InvalidConfig("vector_field and text_field must be set".into()));
        }
        if self.dimension == 0 {
            return Err(RagError::InvalidConfig("index dimension must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Build state of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexState {
    /// Declared but not yet building.
    Creating,
    /// The backend is building the search structure.
    Building,
    /// Queryable.
    Ready,
    /// The build failed. Terminal.
    Failed,
}

impl IndexState {
    /// Map a backend status string onto the lifecycle.
    ///
    /// `STALE` indexes are still queryable and count as ready. Statuses that
    /// mean the index is going away count as failed. Unknown statuses are
    /// treated as still building.
    pub fn from_backend(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "PENDING" | "CREATING" | "INITIALIZING" => IndexState::Creating,
            "READY" | "STALE" => IndexState::Ready,
            "FAILED" | "DELETING" | "DOES_NOT_EXIST" => IndexState::Failed,
            _ => IndexState::Building,
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, IndexState::Ready | IndexState::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: IndexState) -> bool {
        use IndexState::*;
        matches!(
            (self, next),
            (Creating, Building) | (Creating, Failed) | (Building, Ready) | (Building, Failed)
        ) || self == next
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexState::Creating => "CREATING",
            IndexState::Building => "BUILDING",
            IndexState::Ready => "READY",
            IndexState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A status report for a named index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Current lifecycle state.
    pub state: IndexState,
    /// Backend-provided detail, e.g. a failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl IndexStatus {
    pub fn new(state: IndexState) -> Self {
        Self { state, detail: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self { state: IndexState::Failed, detail: Some(reason.into()) }
    }
}

/// Which retrieval algorithm to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Top-k by raw similarity.
    #[default]
    Similarity,
    /// Maximal marginal relevance over the `fetch_k` nearest candidates.
    Mmr,
}

/// A retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Natural-language query text.
    pub text: String,
    /// Number of results to return.
    pub k: usize,
    /// Candidate pool size for MMR. Ignored by similarity search.
    pub fetch_k: usize,
    /// MMR relevance/diversity balance in `[0, 1]`. Ignored by similarity search.
    pub lambda: f32,
    /// Optional metadata pre-filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetadataFilter>,
}

impl Query {
    /// Create a query with `k = 4`, `fetch_k = 20`, `lambda = 0.5`.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), k: 4, fetch_k: 20, lambda: 0.5, filter: None }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_fetch_k(mut self, fetch_k: usize) -> Self {
        self.fetch_k = fetch_k;
        self
    }

    pub fn with_lambda(mut self, lambda: f32) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    fn validate_k(&self) -> Result<()> {
        if self.k == 0 {
            return Err(RagError::InvalidConfig("k must be greater than zero".into()));
        }
        Ok(())
    }

    fn validate_mmr(&self) -> Result<()> {
        self.validate_k()?;
        if self.fetch_k < self.k {
            return Err(RagError::InvalidConfig(format!(
                "fetch_k ({}) must be at least k ({})",
                self.fetch_k, self.k
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(RagError::InvalidConfig(format!(
                "lambda ({}) must be within [0, 1]",
                self.lambda
            )));
        }
        Ok(())
    }
}

/// Handle to a named index on a vector store.
///
/// Cheap to clone; all clones share the same store and embedding provider.
#[derive(Clone)]
pub struct VectorIndex {
    definition: IndexDefinition,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex")
            .field("definition", &self.definition)
            .field("backend", &self.store.backend_name())
            .field("collection", &self.store.collection())
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

impl VectorIndex {
    /// Bind to an index without declaring it on the backend.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if the definition is invalid or its
    /// dimension differs from the embedding provider's.
    pub fn new(
        definition: IndexDefinition,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        definition.validate()?;
        if definition.dimension != embedder.dimensions() {
            return Err(RagError::InvalidConfig(format!(
                "index '{}' declares dimension {} but provider '{}' produces {}",
                definition.name,
                definition.dimension,
                embedder.name(),
                embedder.dimensions()
            )));
        }
        Ok(Self { definition, store, embedder })
    }

    /// Declare the index on the backend and return a handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexAlreadyExists`] if the name is taken.
    pub async fn create(
        definition: IndexDefinition,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let index = Self::new(definition, store, embedder)?;
        index.store.create_index(&index.definition).await?;
        info!(
            index = %index.definition.name,
            collection = index.store.collection(),
            dimension = index.definition.dimension,
            similarity = %index.definition.similarity,
            "declared vector index"
        );
        Ok(index)
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Bulk-insert embedded chunks into the underlying collection.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if any vector has the wrong length.
    pub async fn insert_all(&self, records: &[EmbeddedChunk]) -> Result<()> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.definition.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.definition.dimension,
                actual: bad.vector.len(),
            });
        }
        if records.is_empty() {
            return Ok(());
        }
        self.store.insert_all(records).await?;
        debug!(index = %self.definition.name, count = records.len(), "inserted records");
        Ok(())
    }

    /// Current build status. An index the backend does not list yet reports `Creating`.
    pub async fn status(&self) -> Result<IndexStatus> {
        Ok(self
            .store
            .index_status(&self.definition.name)
            .await?
            .unwrap_or_else(|| IndexStatus::new(IndexState::Creating)))
    }

    /// Wait until the index is ready. See [`sync::await_ready`].
    pub async fn await_ready(&self, config: &SyncConfig, cancel: &CancellationToken) -> Result<()> {
        sync::await_ready(self.store.as_ref(), &self.definition.name, config, cancel).await
    }

    /// Run the retrieval algorithm selected by `mode`.
    pub async fn search(&self, query: &Query, mode: RetrievalMode) -> Result<Vec<SearchResult>> {
        match mode {
            RetrievalMode::Similarity => self.similarity_search(query).await,
            RetrievalMode::Mmr => self.max_marginal_relevance_search(query).await,
        }
    }

    /// Return the `query.k` records most similar to the query text.
    ///
    /// Results are ordered by non-increasing score; ties keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `k == 0`, or propagates
    /// embedding and backend failures.
    pub async fn similarity_search(&self, query: &Query) -> Result<Vec<SearchResult>> {
        query.validate_k()?;
        let vector = self.embed_query(&query.text).await?;
        let records = self.store.search(self.vector_query(&vector, query.k, query)).await?;
        debug!(
            index = %self.definition.name,
            k = query.k,
            hits = records.len(),
            "similarity search"
        );
        Ok(records.into_iter().map(SearchResult::from).collect())
    }

    /// Return up to `query.k` records balancing relevance against redundancy.
    ///
    /// Fetches the `query.fetch_k` nearest candidates, then greedily selects
    /// with [`mmr::select`]. Fewer than `k` results are returned when the
    /// candidate pool is smaller than `k`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `k == 0`, `fetch_k < k`, or
    /// `lambda` is outside `[0, 1]`.
    pub async fn max_marginal_relevance_search(&self, query: &Query) -> Result<Vec<SearchResult>> {
        query.validate_mmr()?;
        let vector = self.embed_query(&query.text).await?;
        let candidates = self.store.search(self.vector_query(&vector, query.fetch_k, query)).await?;

        let vectors: Vec<&[f32]> = candidates.iter().map(|c| c.record.vector.as_slice()).collect();
        let order =
            mmr::select(&vector, &vectors, query.k, query.lambda, self.definition.similarity);
        debug!(
            index = %self.definition.name,
            k = query.k,
            fetch_k = query.fetch_k,
            lambda = query.lambda,
            candidates = candidates.len(),
            selected = order.len(),
            "mmr search"
        );

        let mut slots: Vec<Option<_>> = candidates.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .map(SearchResult::from)
            .collect())
    }

    fn vector_query<'a>(
        &'a self,
        vector: &'a [f32],
        limit: usize,
        query: &'a Query,
    ) -> VectorQuery<'a> {
        VectorQuery { index: &self.definition.name, vector, limit, filter: query.filter.as_ref() }
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.definition.dimension {
            warn!(
                index = %self.definition.name,
                expected = self.definition.dimension,
                actual = vector.len(),
                "query embedding has unexpected dimension"
            );
            return Err(RagError::DimensionMismatch {
                expected: self.definition.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}
