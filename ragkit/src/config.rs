//! Configuration for the RAG pipeline.

use serde::{Deserialize, Serialize};

use crate::chain::DEFAULT_CONTEXT_DELIMITER;
use crate::error::{RagError, Result};
use crate::index::{IndexDefinition, Query, RetrievalMode};
use crate::prompt::PromptTemplate;
use crate::sync::SyncConfig;

/// Configuration parameters for the RAG pipeline.
///
/// Every field has a default, so a partial JSON document deserializes into a
/// usable config. Run [`validate`](RagConfig::validate) (or go through
/// [`RagConfig::builder`]) before handing a deserialized config to a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of results returned by retrieval.
    pub top_k: usize,
    /// MMR candidate pool size.
    pub fetch_k: usize,
    /// MMR relevance/diversity balance in `[0, 1]`.
    pub mmr_lambda: f32,
    /// Retrieval algorithm used by the chain.
    pub retrieval_mode: RetrievalMode,
    /// The vector index to declare and query.
    pub index: IndexDefinition,
    /// How long and how often to poll while the index builds.
    pub sync: SyncConfig,
    /// Prompt with `{context}` and `{question}` placeholders.
    pub prompt_template: PromptTemplate,
    /// Separator between chunk texts in the prompt context.
    pub context_delimiter: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 20,
            top_k: 4,
            fetch_k: 20,
            mmr_lambda: 0.5,
            retrieval_mode: RetrievalMode::Similarity,
            index: IndexDefinition::default(),
            sync: SyncConfig::default(),
            prompt_template: PromptTemplate::default(),
            context_delimiter: DEFAULT_CONTEXT_DELIMITER.to_string(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// A [`Query`] for `text` carrying this config's `k`, `fetch_k`, and `lambda`.
    pub fn query(&self, text: impl Into<String>) -> Query {
        Query::new(text).with_k(self.top_k).with_fetch_k(self.fetch_k).with_lambda(self.mmr_lambda)
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0` or `fetch_k < top_k`
    /// - `mmr_lambda` is outside `[0, 1]`
    /// - the index definition or sync settings are invalid
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be greater than zero".to_string()));
        }
        if self.fetch_k < self.top_k {
            return Err(RagError::InvalidConfig(format!(
                "fetch_k ({}) must be at least top_k ({})",
                self.fetch_k, self.top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(RagError::InvalidConfig(format!(
                "mmr_lambda ({}) must be within [0, 1]",
                self.mmr_lambda
            )));
        }
        self.index.validate()?;
        self.sync.validate()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn fetch_k(mut self, fetch_k: usize) -> Self {
        self.config.fetch_k = fetch_k;
        self
    }

    pub fn mmr_lambda(mut self, lambda: f32) -> Self {
        self.config.mmr_lambda = lambda;
        self
    }

    pub fn retrieval_mode(mut self, mode: RetrievalMode) -> Self {
        self.config.retrieval_mode = mode;
        self
    }

    /// Set the index declaration, including its dimension.
    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.config.index = index;
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.config.sync = sync;
        self
    }

    pub fn prompt_template(mut self, template: PromptTemplate) -> Self {
        self.config.prompt_template = template;
        self
    }

    pub fn context_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.config.context_delimiter = delimiter.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
