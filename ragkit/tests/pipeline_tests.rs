//! End-to-end tests: ingest → wait for index → retrieve → answer.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FailingEmbedder, FailingModel, MisreportingEmbedder, RecordingModel, THREE_PARAGRAPHS};
use ragkit::prompt::DEFAULT_TEMPLATE;
use ragkit::{
    Chunk, Document, EmbeddedChunk, EmbeddingProvider, HashingEmbeddingProvider, IndexDefinition,
    InMemoryVectorStore, LanguageModel, RagConfig, RagError, RagPipeline, RetrievalMode, SyncConfig,
    VectorStore,
};

const DIM: usize = 256;

fn config() -> RagConfig {
    RagConfig::builder()
        .chunk_size(200)
        .chunk_overlap(20)
        .index(IndexDefinition::new("vector_index", DIM))
        .sync(
            SyncConfig::default()
                .poll_interval(Duration::from_millis(50))
                .timeout(Duration::from_secs(5)),
        )
        .build()
        .unwrap()
}

fn pipeline_with(
    config: RagConfig,
    store: Arc<InMemoryVectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    model: Option<Arc<dyn LanguageModel>>,
) -> RagPipeline {
    let mut builder =
        RagPipeline::builder().config(config).embedding_provider(embedder).vector_store(store);
    if let Some(model) = model {
        builder = builder.language_model(model);
    }
    builder.build().unwrap()
}

fn hashing() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbeddingProvider::new(DIM).unwrap())
}

fn paragraph_two_range() -> std::ops::Range<usize> {
    let start = THREE_PARAGRAPHS.find("Volcanic").unwrap();
    let end = THREE_PARAGRAPHS.find("Chess").unwrap();
    // Plain ASCII, so byte offsets equal char offsets.
    start..end
}

fn overlaps(chunk: &Chunk, range: &std::ops::Range<usize>) -> bool {
    chunk.source_offset.start < range.end && range.start < chunk.source_offset.end
}

#[tokio::test(start_paused = true)]
async fn question_about_second_paragraph_retrieves_it_in_top_three() {
    let store = Arc::new(InMemoryVectorStore::new("test").with_build_polls(3));
    let pipeline = pipeline_with(config(), store.clone(), hashing(), None);

    let index = pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap();
    assert_eq!(index.status().await.unwrap().state, ragkit::IndexState::Ready);
    assert!(store.len().await >= 3);

    let question = "What happens when magma rises and a volcano erupts lava?";
    let query = pipeline.config().query(question).with_k(3);
    let results = pipeline.search(&query, RetrievalMode::Similarity).await.unwrap();

    assert_eq!(results.len(), 3);
    let target = paragraph_two_range();
    assert!(
        results.iter().any(|r| overlaps(&r.chunk, &target)),
        "paragraph two missing from {:?}",
        results.iter().map(|r| &r.chunk.text).collect::<Vec<_>>()
    );
}

#[tokio::test(start_paused = true)]
async fn unrelated_question_still_grounds_the_prompt() {
    let store = Arc::new(InMemoryVectorStore::new("test"));
    let model = Arc::new(RecordingModel::new("  I don't know based on the context.\n"));
    let pipeline = pipeline_with(config(), store.clone(), hashing(), Some(model.clone()));
    pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap();

    let question = "What is the capital city of Australia?";
    let answer = pipeline.answer(question).await.unwrap();

    let stored = store.len().await;
    assert_eq!(answer.context_used.len(), pipeline.config().top_k.min(stored));
    assert_eq!(answer.answer, "I don't know based on the context.");
    assert_eq!(answer.question, question);

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert!(prompt.starts_with("Answer the question based only on the following context:"));
    assert!(prompt.ends_with(&format!("Question: {question}")));
    for chunk in &answer.context_used {
        assert!(prompt.contains(&chunk.text));
    }
    assert!(!answer.context_used.iter().any(|c| c.text.contains("Australia")));
}

#[tokio::test(start_paused = true)]
async fn context_is_joined_in_retrieval_order() {
    let model = Arc::new(RecordingModel::new("ok"));
    let pipeline = pipeline_with(
        config(),
        Arc::new(InMemoryVectorStore::new("test")),
        hashing(),
        Some(model.clone()),
    );
    pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap();

    let answer = pipeline.answer("sourdough starter yeast").await.unwrap();
    let context =
        answer.context_used.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n");
    let expected = DEFAULT_TEMPLATE
        .replace("{context}", &context)
        .replace("{question}", "sourdough starter yeast");
    assert_eq!(model.prompts()[0], expected);
}

#[tokio::test(start_paused = true)]
async fn mmr_chain_answers_from_diverse_context() {
    let config = RagConfig::builder()
        .index(IndexDefinition::new("vector_index", DIM))
        .retrieval_mode(RetrievalMode::Mmr)
        .top_k(3)
        .fetch_k(10)
        .build()
        .unwrap();
    let model = Arc::new(RecordingModel::new("```text\nLava and ash.\n```"));
    let pipeline = pipeline_with(
        config,
        Arc::new(InMemoryVectorStore::new("test")),
        hashing(),
        Some(model.clone()),
    );
    pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap();

    let answer = pipeline.answer("What does a volcano release?").await.unwrap();
    assert_eq!(answer.answer, "Lava and ash.");
    assert_eq!(answer.context_used.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn empty_document_leaves_an_empty_but_ready_index() {
    let model = Arc::new(RecordingModel::new("No context."));
    let pipeline = pipeline_with(
        config(),
        Arc::new(InMemoryVectorStore::new("test")),
        hashing(),
        Some(model.clone()),
    );

    pipeline.ingest(&Document::new("empty", "")).await.unwrap();
    let answer = pipeline.answer("anything?").await.unwrap();

    assert!(answer.context_used.is_empty());
    assert_eq!(answer.answer, "No context.");
    assert!(model.prompts()[0].contains("following context:\n\n\nQuestion: anything?"));
}

#[tokio::test(start_paused = true)]
async fn reingesting_appends_and_reuses_the_index() {
    let store = Arc::new(InMemoryVectorStore::new("test"));
    let pipeline = pipeline_with(config(), store.clone(), hashing(), None);
    let document = Document::new("doc", THREE_PARAGRAPHS);

    pipeline.ingest(&document).await.unwrap();
    let first = store.len().await;
    pipeline.ingest(&document).await.unwrap();

    assert_eq!(store.len().await, first * 2);
}

#[tokio::test(start_paused = true)]
async fn slow_build_times_out() {
    let config = RagConfig::builder()
        .index(IndexDefinition::new("vector_index", DIM))
        .sync(
            SyncConfig::default()
                .poll_interval(Duration::from_millis(100))
                .timeout(Duration::from_millis(500)),
        )
        .build()
        .unwrap();
    let store = Arc::new(InMemoryVectorStore::new("test").with_build_polls(100));
    let pipeline = pipeline_with(config, store, hashing(), None);

    let err = pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap_err();
    assert!(matches!(err, RagError::IndexBuildTimeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn corrupt_records_fail_the_build() {
    let store = Arc::new(InMemoryVectorStore::new("test"));
    let stray = Chunk {
        text: "stray".into(),
        source_offset: 0..5,
        metadata: Default::default(),
        document_id: "other".into(),
        index: 0,
    };
    store.insert_all(&[EmbeddedChunk::new(stray, vec![1.0; 3])]).await.unwrap();
    let pipeline = pipeline_with(config(), store, hashing(), None);

    let err = pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::IndexBuildFailed { ref reason, .. } if reason.contains("dimension 3")
    ));
}

#[tokio::test]
async fn embedding_failure_inserts_nothing() {
    let store = Arc::new(InMemoryVectorStore::new("test"));
    let embedder = Arc::new(FailingEmbedder { dimensions: DIM });
    let pipeline = pipeline_with(config(), store.clone(), embedder, None);

    let err = pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
    assert!(err.is_retryable());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn misreported_dimensions_are_caught() {
    let store = Arc::new(InMemoryVectorStore::new("test"));
    let embedder = Arc::new(MisreportingEmbedder { declared: DIM, actual: 8 });
    let pipeline = pipeline_with(config(), store.clone(), embedder, None);

    let err = pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: DIM, actual: 8 }));
    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn generation_failure_propagates() {
    let pipeline = pipeline_with(
        config(),
        Arc::new(InMemoryVectorStore::new("test")),
        hashing(),
        Some(Arc::new(FailingModel)),
    );
    pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap();

    let err = pipeline.answer("What is sourdough?").await.unwrap_err();
    assert!(matches!(err, RagError::GenerationError { .. }));
}

#[tokio::test]
async fn answering_without_a_model_is_a_config_error() {
    let pipeline =
        pipeline_with(config(), Arc::new(InMemoryVectorStore::new("test")), hashing(), None);
    assert!(matches!(pipeline.answer("q").await, Err(RagError::InvalidConfig(_))));
}

#[tokio::test]
async fn cancelled_pipeline_refuses_to_ingest() {
    let store = Arc::new(InMemoryVectorStore::new("test"));
    let pipeline = pipeline_with(config(), store.clone(), hashing(), None);
    pipeline.cancellation_token().cancel();

    let err = pipeline.ingest(&Document::new("doc", THREE_PARAGRAPHS)).await.unwrap_err();
    assert!(matches!(err, RagError::Cancelled(_)));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn mismatched_index_dimension_is_rejected_at_build() {
    let result = RagPipeline::builder()
        .config(
            RagConfig::builder().index(IndexDefinition::new("vector_index", 1536)).build().unwrap(),
        )
        .embedding_provider(hashing())
        .vector_store(Arc::new(InMemoryVectorStore::new("test")))
        .build();
    assert!(matches!(result, Err(RagError::InvalidConfig(_))));
}

#[tokio::test]
async fn default_config_takes_dimension_from_provider() {
    let pipeline = RagPipeline::builder()
        .embedding_provider(hashing())
        .vector_store(Arc::new(InMemoryVectorStore::new("test")))
        .build()
        .unwrap();
    assert_eq!(pipeline.index().definition().dimension, DIM);
    assert_eq!(pipeline.config().chunk_size, 200);
    pipeline.close().await.unwrap();
}
