//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full workflow by composing an
//! [`EmbeddingProvider`], a [`VectorStore`], a [`Chunker`], and an optional
//! [`LanguageModel`]:
//!
//! 1. **ingest**: chunk → embed → insert → declare index → wait until ready
//! 2. **search**: similarity or MMR retrieval against the ready index
//! 3. **answer**: retrieval → prompt → generation through a [`RagChain`]
//!
//! # Example
//!
//! ```rust,ignore
//! use ragkit::{RagPipeline, RagConfig, InMemoryVectorStore, HashingEmbeddingProvider};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(config)
//!     .embedding_provider(Arc::new(embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new("docs")))
//!     .language_model(Arc::new(model))
//!     .build()?;
//!
//! pipeline.ingest(&document).await?;
//! let answer = pipeline.answer("What is X?").await?;
//! pipeline.close().await?;
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::chain::RagChain;
use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Document, EmbeddedChunk, RagAnswer, SearchResult};
use crate::embedding::{EmbeddingProvider, check_batch};
use crate::error::{RagError, Result};
use crate::index::{Query, RetrievalMode, VectorIndex};
use crate::llm::LanguageModel;
use crate::vectorstore::VectorStore;

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. The pipeline owns one
/// [`CancellationToken`]; cancelling it aborts ingestion between steps and
/// interrupts a pending index wait.
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    language_model: Option<Arc<dyn LanguageModel>>,
    index: VectorIndex,
    cancel: CancellationToken,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// The index handle this pipeline ingests into and searches.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// A clone of the pipeline's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ingest a single document and wait until its index is queryable.
    ///
    /// Chunks the document, embeds every chunk in one batch, appends the
    /// records to the store, declares the index if it does not exist yet,
    /// then polls until the index is `Ready`. Re-ingesting a document
    /// appends new records; nothing is deduplicated.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingError`] / [`RagError::DimensionMismatch`] from embedding
    /// - [`RagError::VectorStoreError`] from insertion or index declaration
    /// - [`RagError::IndexBuildFailed`] / [`RagError::IndexBuildTimeout`] while waiting
    /// - [`RagError::Cancelled`] if the pipeline's token fires
    pub async fn ingest(&self, document: &Document) -> Result<VectorIndex> {
        self.ingest_batch(std::slice::from_ref(document)).await
    }

    /// Ingest several documents, then declare and wait for the index once.
    ///
    /// Stops at the first document that fails; records already inserted for
    /// earlier documents stay in the store.
    pub async fn ingest_batch(&self, documents: &[Document]) -> Result<VectorIndex> {
        for document in documents {
            self.insert_document(document).await?;
        }
        self.ensure_index().await?;
        self.check_cancelled("waiting for index")?;
        self.index.await_ready(&self.config.sync, &self.cancel).await?;
        Ok(self.index.clone())
    }

    /// Run the configured retrieval algorithm for `query`.
    pub async fn search(&self, query: &Query, mode: RetrievalMode) -> Result<Vec<SearchResult>> {
        self.index.search(query, mode).await
    }

    /// Similarity search with the configured `top_k`.
    pub async fn similarity_search(&self, text: &str) -> Result<Vec<SearchResult>> {
        self.index.similarity_search(&self.config.query(text)).await
    }

    /// MMR search with the configured `top_k`, `fetch_k`, and `mmr_lambda`.
    pub async fn max_marginal_relevance_search(&self, text: &str) -> Result<Vec<SearchResult>> {
        self.index.max_marginal_relevance_search(&self.config.query(text)).await
    }

    /// Build the question-answering chain from the pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if no language model was set.
    pub fn chain(&self) -> Result<RagChain> {
        let model = self.language_model.clone().ok_or_else(|| {
            RagError::InvalidConfig("a language model is required to answer questions".to_string())
        })?;
        Ok(RagChain::new(self.index.clone(), model)
            .with_mode(self.config.retrieval_mode)
            .with_query(self.config.query(""))
            .with_prompt(self.config.prompt_template.clone())
            .with_delimiter(self.config.context_delimiter.clone()))
    }

    /// Answer a question grounded in the ingested documents.
    pub async fn answer(&self, question: &str) -> Result<RagAnswer> {
        self.chain()?.answer(question).await
    }

    /// Release the vector store's connections.
    pub async fn close(&self) -> Result<()> {
        self.vector_store.close().await?;
        debug!(backend = self.vector_store.backend_name(), "closed vector store");
        Ok(())
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        self.check_cancelled("ingesting")?;

        let chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedding_provider.embed_batch(&texts).await.inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
        })?;
        check_batch(self.embedding_provider.as_ref(), chunks.len(), &vectors)?;

        self.check_cancelled("ingesting")?;

        let records: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk::new(chunk, vector))
            .collect();
        self.index.insert_all(&records).await.inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "insert failed during ingestion");
        })?;

        info!(document.id = %document.id, chunk_count = records.len(), "ingested document");
        Ok(())
    }

    /// Declare the index unless the backend already lists it.
    async fn ensure_index(&self) -> Result<()> {
        let name = self.index.name();
        if self.vector_store.index_status(name).await?.is_some() {
            debug!(index = name, "reusing existing index");
            return Ok(());
        }
        match self.vector_store.create_index(self.index.definition()).await {
            Ok(()) => {
                info!(
                    index = name,
                    collection = self.vector_store.collection(),
                    dimension = self.index.definition().dimension,
                    "declared vector index"
                );
                Ok(())
            }
            // Another writer declared it between the probe and the create.
            Err(RagError::IndexAlreadyExists { .. }) => {
                debug!(index = name, "index declared concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn check_cancelled(&self, during: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RagError::Cancelled(during.to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider` and `vector_store` are required. Without a chunker
/// the pipeline uses a [`RecursiveChunker`] sized from the config; without a
/// config it uses [`RagConfig::default`] with the index dimension taken from
/// the embedding provider.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    cancel: Option<CancellationToken>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Override the default recursive chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the model used by [`RagPipeline::answer`].
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Share a cancellation token, e.g. one tied to a shutdown signal.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if a required field is missing,
    /// the config is invalid, or the index dimension differs from the
    /// embedding provider's.
    pub fn build(self) -> Result<RagPipeline> {
        let embedding_provider = self.embedding_provider.ok_or_else(|| {
            RagError::InvalidConfig("embedding_provider is required".to_string())
        })?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::InvalidConfig("vector_store is required".to_string()))?;
        let config = self.config.unwrap_or_else(|| {
            let mut config = RagConfig::default();
            config.index.dimension = embedding_provider.dimensions();
            config
        });
        config.validate()?;

        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let index = VectorIndex::new(
            config.index.clone(),
            Arc::clone(&vector_store),
            Arc::clone(&embedding_provider),
        )?;

        Ok(RagPipeline {
            config,
            embedding_provider,
            vector_store,
            chunker,
            language_model: self.language_model,
            index,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}
