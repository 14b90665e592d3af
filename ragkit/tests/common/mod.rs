//! Shared test doubles for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ragkit::{
    EmbeddedChunk, EmbeddingProvider, IndexDefinition, IndexState, IndexStatus, LanguageModel,
    RagError, Result, ScoredRecord, VectorQuery, VectorStore,
};

/// Returns the same vector for every input.
pub struct StaticEmbedder {
    pub vector: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.vector.clone())
    }

    fn dimensions(&self) -> usize {
        self.vector.len()
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Always fails, as an unreachable embedding service would.
pub struct FailingEmbedder {
    pub dimensions: usize,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError {
            provider: "failing".into(),
            message: "service unavailable".into(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Claims one dimension but returns vectors of another.
pub struct MisreportingEmbedder {
    pub declared: usize,
    pub actual: usize,
}

#[async_trait]
impl EmbeddingProvider for MisreportingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0; self.actual])
    }

    fn dimensions(&self) -> usize {
        self.declared
    }
}

/// A store whose index status follows a script, one entry per poll.
///
/// The last entry repeats once the script runs out. `None` entries mean the
/// index is not listed yet.
pub struct ScriptedStore {
    script: Mutex<VecDeque<Option<IndexState>>>,
    last: Mutex<Option<IndexState>>,
    polls: AtomicUsize,
    failure_detail: Option<String>,
}

impl ScriptedStore {
    pub fn new(script: impl IntoIterator<Item = Option<IndexState>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            polls: AtomicUsize::new(0),
            failure_detail: None,
        }
    }

    pub fn with_failure_detail(mut self, detail: &str) -> Self {
        self.failure_detail = Some(detail.to_string());
        self
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for ScriptedStore {
    fn backend_name(&self) -> &str {
        "scripted"
    }

    fn collection(&self) -> &str {
        "scripted"
    }

    async fn insert_all(&self, _records: &[EmbeddedChunk]) -> Result<()> {
        Ok(())
    }

    async fn create_index(&self, _definition: &IndexDefinition) -> Result<()> {
        Ok(())
    }

    async fn index_status(&self, _name: &str) -> Result<Option<IndexStatus>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok((*last).map(|state| IndexStatus {
            state,
            detail: (state == IndexState::Failed).then(|| self.failure_detail.clone()).flatten(),
        }))
    }

    async fn search(&self, _query: VectorQuery<'_>) -> Result<Vec<ScoredRecord>> {
        Ok(Vec::new())
    }
}

/// Records every prompt and answers with a fixed reply.
pub struct RecordingModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    pub fn new(reply: &str) -> Self {
        Self { reply: reply.to_string(), prompts: Mutex::new(Vec::new()) }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Always fails with a generation error.
pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::GenerationError {
            provider: "failing".into(),
            message: "rate limited".into(),
        })
    }
}

/// Three paragraphs on unrelated topics, each longer than one 200-char chunk.
pub const THREE_PARAGRAPHS: &str = "\
Sourdough bread relies on a starter culture of wild yeast and lactic acid bacteria. \
Bakers feed the starter with flour and water every day, and the long fermentation \
gives the loaf its sour taste, open crumb, and thick crackling crust.

Volcanic eruptions happen when magma rises through the crust of the planet. \
Pressure from dissolved gases in the magma builds until the volcano erupts, \
releasing lava flows, ash clouds, and pyroclastic debris across the landscape.

Chess openings such as the Sicilian Defence and the Queen's Gambit shape the \
middlegame. Grandmasters memorise long opening lines, but understanding pawn \
structures and piece activity matters more than rote memorisation.";
