//! The question → answer chain.
//!
//! [`RagChain`] is a fixed composition of five typed stages:
//!
//! 1. [`Retrieve`]: `String` → [`Retrieved`]
//! 2. [`FormatContext`]: [`Retrieved`] → [`PromptInputs`]
//! 3. [`RenderPrompt`]: [`PromptInputs`] → [`RenderedPrompt`]
//! 4. [`Generate`]: [`RenderedPrompt`] → [`Generation`]
//! 5. [`ExtractAnswer`]: [`Generation`] → [`RagAnswer`]
//!
//! Each stage carries the question and retrieved chunks forward so the final
//! [`RagAnswer`] can report the exact context the model saw.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragkit::{RagChain, RetrievalMode};
//!
//! let chain = RagChain::new(index, Arc::new(model)).with_mode(RetrievalMode::Mmr);
//! let answer = chain.answer("What is X?").await?;
//! println!("{}", answer.answer);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::document::{Chunk, RagAnswer, SearchResult};
use crate::error::Result;
use crate::index::{Query, RetrievalMode, VectorIndex};
use crate::llm::LanguageModel;
use crate::prompt::PromptTemplate;

/// Separator placed between chunk texts in the rendered context.
pub const DEFAULT_CONTEXT_DELIMITER: &str = "\n\n";

/// One step of the chain with a declared input and output type.
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Send + 'static;
    type Output: Send;

    async fn run(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Output of [`Retrieve`].
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub question: String,
    pub results: Vec<SearchResult>,
}

/// Output of [`FormatContext`].
#[derive(Debug, Clone)]
pub struct PromptInputs {
    pub question: String,
    pub context: String,
    pub chunks: Vec<Chunk>,
}

/// Output of [`RenderPrompt`].
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub question: String,
    pub prompt: String,
    pub chunks: Vec<Chunk>,
}

/// Output of [`Generate`].
#[derive(Debug, Clone)]
pub struct Generation {
    pub question: String,
    pub chunks: Vec<Chunk>,
    pub raw: String,
}

/// Runs a retrieval against the index with the question as query text.
#[derive(Debug, Clone)]
pub struct Retrieve {
    index: VectorIndex,
    mode: RetrievalMode,
    /// `k`, `fetch_k`, `lambda`, and `filter` for every question; `text` is replaced.
    query: Query,
}

#[async_trait]
impl Stage for Retrieve {
    type Input = String;
    type Output = Retrieved;

    async fn run(&self, question: String) -> Result<Retrieved> {
        let query = Query { text: question.clone(), ..self.query.clone() };
        let results = self.index.search(&query, self.mode).await?;
        Ok(Retrieved { question, results })
    }
}

/// Joins chunk texts, in result order, into one context string.
#[derive(Debug, Clone)]
pub struct FormatContext {
    delimiter: String,
}

#[async_trait]
impl Stage for FormatContext {
    type Input = Retrieved;
    type Output = PromptInputs;

    async fn run(&self, input: Retrieved) -> Result<PromptInputs> {
        let chunks: Vec<Chunk> = input.results.into_iter().map(|r| r.chunk).collect();
        let context =
            chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(&self.delimiter);
        Ok(PromptInputs { question: input.question, context, chunks })
    }
}

/// Substitutes context and question into the prompt template.
#[derive(Debug, Clone)]
pub struct RenderPrompt {
    template: PromptTemplate,
}

#[async_trait]
impl Stage for RenderPrompt {
    type Input = PromptInputs;
    type Output = RenderedPrompt;

    async fn run(&self, input: PromptInputs) -> Result<RenderedPrompt> {
        let prompt = self.template.render(&input.context, &input.question);
        Ok(RenderedPrompt { question: input.question, prompt, chunks: input.chunks })
    }
}

/// Invokes the language model once. Failures propagate without retry.
#[derive(Clone)]
pub struct Generate {
    model: Arc<dyn LanguageModel>,
}

#[async_trait]
impl Stage for Generate {
    type Input = RenderedPrompt;
    type Output = Generation;

    async fn run(&self, input: RenderedPrompt) -> Result<Generation> {
        debug!(
            model = self.model.name(),
            prompt_len = input.prompt.len(),
            "invoking language model"
        );
        let raw = self.model.generate(&input.prompt).await?;
        Ok(Generation { question: input.question, chunks: input.chunks, raw })
    }
}

/// Reduces the model response to plain answer text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractAnswer;

#[async_trait]
impl Stage for ExtractAnswer {
    type Input = Generation;
    type Output = RagAnswer;

    async fn run(&self, input: Generation) -> Result<RagAnswer> {
        Ok(RagAnswer {
            question: input.question,
            context_used: input.chunks,
            answer: extract_text(&input.raw),
        })
    }
}

/// Trim surrounding whitespace and unwrap a response fenced as a single code block.
pub fn extract_text(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```").and_then(|s| s.strip_suffix("```")) else {
        return trimmed.to_string();
    };
    // Drop an info string such as ```text on the opening line.
    let body = match inner.split_once('\n') {
        Some((info, body)) if !info.contains(' ') => body,
        _ => inner,
    };
    body.trim().to_string()
}

/// Retrieval, prompt construction, generation, and extraction in one call.
#[derive(Clone)]
pub struct RagChain {
    retrieve: Retrieve,
    format: FormatContext,
    render: RenderPrompt,
    generate: Generate,
    extract: ExtractAnswer,
}

impl RagChain {
    /// Create a chain using similarity search with `k = 4` and the default prompt.
    pub fn new(index: VectorIndex, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            retrieve: Retrieve { index, mode: RetrievalMode::Similarity, query: Query::new("") },
            format: FormatContext { delimiter: DEFAULT_CONTEXT_DELIMITER.to_string() },
            render: RenderPrompt { template: PromptTemplate::default() },
            generate: Generate { model },
            extract: ExtractAnswer,
        }
    }

    /// Select the retrieval algorithm.
    pub fn with_mode(mut self, mode: RetrievalMode) -> Self {
        self.retrieve.mode = mode;
        self
    }

    /// Set `k`, `fetch_k`, `lambda`, and `filter` used for every question.
    pub fn with_query(mut self, query: Query) -> Self {
        self.retrieve.query = query;
        self
    }

    pub fn with_prompt(mut self, template: PromptTemplate) -> Self {
        self.render.template = template;
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.format.delimiter = delimiter.into();
        self
    }

    /// Answer one question grounded in retrieved context.
    ///
    /// An empty retrieval is not an error: the model receives an empty
    /// context and the prompt tells it to rely on that context only.
    ///
    /// # Errors
    ///
    /// Propagates retrieval errors and
    /// [`RagError::GenerationError`](crate::RagError::GenerationError).
    pub async fn answer(&self, question: &str) -> Result<RagAnswer> {
        let retrieved = self.retrieve.run(question.to_string()).await?;
        if retrieved.results.is_empty() {
            warn!(
                index = self.retrieve.index.name(),
                "no context retrieved; answering from empty context"
            );
        }
        let inputs = self.format.run(retrieved).await?;
        let prompt = self.render.run(inputs).await?;
        let generation = self.generate.run(prompt).await?;
        let answer = self.extract.run(generation).await?;

        info!(
            index = self.retrieve.index.name(),
            mode = ?self.retrieve.mode,
            context_chunks = answer.context_used.len(),
            answer_len = answer.answer.len(),
            "answered question"
        );
        Ok(answer)
    }
}
