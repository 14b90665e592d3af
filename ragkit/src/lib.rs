//! # ragkit
//!
//! Retrieval-augmented generation over a vector index whose build runs
//! asynchronously on the backend.
//!
//! ## Overview
//!
//! - [`chunking`] - split documents into overlapping, offset-tracked chunks
//! - [`EmbeddingProvider`] - text → fixed-dimension vectors
//! - [`VectorIndex`] - index lifecycle, similarity search, and MMR search
//! - [`sync::await_ready`] - bounded, cancellable wait for an index build
//! - [`RagChain`] - retrieve → prompt → generate → extract
//! - [`RagPipeline`] - ties everything together behind `ingest` / `search` / `answer`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragkit::{
//!     Document, HashingEmbeddingProvider, IndexDefinition, InMemoryVectorStore, RagConfig,
//!     RagPipeline,
//! };
//!
//! let config = RagConfig::builder().index(IndexDefinition::new("vector_index", 256)).build()?;
//! let pipeline = RagPipeline::builder()
//!     .config(config)
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new(256)?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new("docs")))
//!     .language_model(Arc::new(model))
//!     .build()?;
//!
//! pipeline.ingest(&Document::new("doc-1", text)).await?;
//! let answer = pipeline.answer("What does the document say about X?").await?;
//! ```
//!
//! ## Features
//!
//! | Feature | Adds |
//! |---------|------|
//! | `openai` | [`openai::OpenAIEmbeddingProvider`] and [`openai::OpenAIChatModel`] |
//! | `atlas` | [`atlas::AtlasVectorStore`] (MongoDB Atlas Vector Search) |
//! | `qdrant` | [`qdrant::QdrantVectorStore`] |
//! | `http` | [`source::HttpSource`] |

pub mod chain;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod hashing;
pub mod index;
pub mod inmemory;
pub mod llm;
pub mod mmr;
pub mod pipeline;
pub mod prompt;
pub mod similarity;
pub mod source;
pub mod sync;
pub mod vectorstore;

#[cfg(feature = "atlas")]
pub mod atlas;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use chain::{RagChain, Stage};
pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, EmbeddedChunk, Metadata, RagAnswer, ScoredRecord, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use filter::MetadataFilter;
pub use hashing::HashingEmbeddingProvider;
pub use index::{IndexDefinition, IndexState, IndexStatus, Query, RetrievalMode, VectorIndex};
pub use inmemory::InMemoryVectorStore;
pub use llm::LanguageModel;
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use prompt::PromptTemplate;
pub use similarity::SimilarityMetric;
pub use source::{DocumentSource, FileSource};
pub use sync::SyncConfig;
pub use tokio_util::sync::CancellationToken;
pub use vectorstore::{VectorQuery, VectorStore};

#[cfg(feature = "atlas")]
pub use atlas::{AtlasConfig, AtlasVectorStore};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIConfig, OpenAIEmbeddingProvider};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
#[cfg(feature = "http")]
pub use source::HttpSource;
