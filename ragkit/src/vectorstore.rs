//! Vector store trait: the boundary to the physical storage backend.

use async_trait::async_trait;

use crate::document::{EmbeddedChunk, ScoredRecord};
use crate::error::Result;
use crate::filter::MetadataFilter;
use crate::index::{IndexDefinition, IndexStatus};

/// A nearest-neighbour request against a declared index.
#[derive(Debug, Clone, Copy)]
pub struct VectorQuery<'a> {
    /// Name of the index to search.
    pub index: &'a str,
    /// The query vector.
    pub vector: &'a [f32],
    /// Maximum number of records to return.
    pub limit: usize,
    /// Optional metadata pre-filter.
    pub filter: Option<&'a MetadataFilter>,
}

/// A persistent collection of [`EmbeddedChunk`]s with ANN index management.
///
/// One store instance is bound to one collection. Implementations hold the
/// backend connection for the lifetime of a session; [`close`](VectorStore::close)
/// releases it and must be called on every exit path.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit::{VectorStore, InMemoryVectorStore, IndexDefinition};
///
/// let store = InMemoryVectorStore::new("docs");
/// store.insert_all(&records).await?;
/// store.create_index(&IndexDefinition::new("vector_index", 1536)).await?;
/// let status = store.index_status("vector_index").await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name used in logs and errors.
    fn backend_name(&self) -> &str;

    /// Name of the collection this store writes to.
    fn collection(&self) -> &str;

    /// Append records to the collection.
    ///
    /// Records are never deduplicated: inserting the same chunk twice yields
    /// two search hits.
    async fn insert_all(&self, records: &[EmbeddedChunk]) -> Result<()>;

    /// Declare an ANN index on the collection.
    ///
    /// Returns [`RagError::IndexAlreadyExists`](crate::RagError::IndexAlreadyExists)
    /// if an index with the same name is already declared.
    async fn create_index(&self, definition: &IndexDefinition) -> Result<()>;

    /// Describe the build status of a named index, or `None` if the backend
    /// does not list it (yet).
    async fn index_status(&self, name: &str) -> Result<Option<IndexStatus>>;

    /// Return up to `query.limit` records ordered by descending similarity,
    /// ties broken by insertion order. Returned records include their vectors.
    async fn search(&self, query: VectorQuery<'_>) -> Result<Vec<ScoredRecord>>;

    /// Release the backend connection.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
