//! `ragkit`: fetch a document, index it, run similarity and MMR searches, and
//! optionally answer a question grounded in the retrieved chunks.
//!
//! ```text
//! ragkit https://example.com/report.pdf --save-to test.pdf \
//!     --query "MongoDB Atlas security" --question "How does Atlas secure my data?"
//! ```

mod args;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ragkit::source::{self, DocumentSource, FileSource};
use ragkit::{
    Document, EmbeddingProvider, HashingEmbeddingProvider, InMemoryVectorStore, LanguageModel,
    RagConfig, RagPipeline, RetrievalMode, SearchResult, VectorStore,
};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::{Args, EmbedderKind, StoreKind};

/// Result count for the demo searches.
const DEMO_K: usize = 3;
/// Candidate pool for the demo MMR search.
const DEMO_FETCH_K: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = load_config(&args).await?;
    let store = connect_store(&args, &config).await?;

    let outcome = run(&args, config, Arc::clone(&store)).await;

    // Release the connection whether or not the run succeeded.
    if let Err(e) = store.close().await {
        warn!(error = %e, backend = store.backend_name(), "failed to close vector store");
    }
    outcome
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: &Args, config: RagConfig, store: Arc<dyn VectorStore>) -> Result<()> {
    let bytes = fetch(&args.locator).await?;
    if let Some(path) = &args.save_to {
        source::persist(&bytes, path)
            .await
            .with_context(|| format!("saving to {}", path.display()))?;
    }
    let document =
        Document::from_bytes(document_id(&args.locator), &bytes).with_source_uri(&args.locator);

    let embedder = embedding_provider(args, &config)?;
    let mut builder =
        RagPipeline::builder().config(config).embedding_provider(embedder).vector_store(store);
    if args.question.is_some() {
        builder = builder.language_model(language_model(args)?);
    }
    let pipeline = builder.build().context("invalid pipeline configuration")?;

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    info!(document.id = %document.id, bytes = bytes.len(), "starting ingestion");
    pipeline.ingest(&document).await.context("ingestion failed")?;

    let query = pipeline.config().query(args.query.as_str()).with_k(DEMO_K);
    let similar = pipeline
        .search(&query, RetrievalMode::Similarity)
        .await
        .context("similarity search failed")?;
    print_results("Semantic search results", &similar)?;

    let query = query.with_fetch_k(DEMO_FETCH_K);
    let diverse = pipeline.search(&query, RetrievalMode::Mmr).await.context("MMR search failed")?;
    print_results("Max marginal relevance search results", &diverse)?;

    if let Some(question) = &args.question {
        let answer = pipeline.answer(question).await.context("answering failed")?;
        println!("Question: {}", answer.question);
        println!("Answer: {}", answer.answer);
    }
    Ok(())
}

async fn load_config(args: &Args) -> Result<RagConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<RagConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => RagConfig::default(),
    };
    if let Some(size) = args.chunk_size {
        config.chunk_size = size;
    }
    if let Some(overlap) = args.chunk_overlap {
        config.chunk_overlap = overlap;
    }
    if let Some(name) = &args.index_name {
        config.index.name = name.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn fetch(locator: &str) -> Result<Vec<u8>> {
    let bytes = if source::is_remote(locator) {
        fetch_remote(locator).await?
    } else {
        FileSource.fetch(locator).await?
    };
    Ok(bytes)
}

#[cfg(feature = "http")]
async fn fetch_remote(locator: &str) -> Result<Vec<u8>> {
    Ok(ragkit::HttpSource::new().fetch(locator).await?)
}

#[cfg(not(feature = "http"))]
async fn fetch_remote(locator: &str) -> Result<Vec<u8>> {
    bail!("cannot fetch {locator}: built without the `http` feature")
}

/// The last path segment of the locator, or the whole locator.
fn document_id(locator: &str) -> String {
    locator
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(locator)
        .to_string()
}

async fn connect_store(args: &Args, config: &RagConfig) -> Result<Arc<dyn VectorStore>> {
    match args.store {
        StoreKind::Memory => Ok(Arc::new(InMemoryVectorStore::new(args.collection.clone()))),
        StoreKind::Atlas => connect_atlas(args, config).await,
        StoreKind::Qdrant => connect_qdrant(args, config),
    }
}

#[cfg(feature = "atlas")]
async fn connect_atlas(args: &Args, config: &RagConfig) -> Result<Arc<dyn VectorStore>> {
    use ragkit::{AtlasConfig, AtlasVectorStore};

    let Some(uri) = &args.atlas_uri else {
        bail!("--atlas-uri or ATLAS_CONNECTION_STRING is required for the Atlas store");
    };
    let atlas = AtlasConfig::new(uri.clone())
        .with_database(args.database.clone())
        .with_collection(args.collection.clone());
    let store =
        AtlasVectorStore::connect(atlas, &config.index).await.context("connecting to Atlas")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "atlas"))]
async fn connect_atlas(_args: &Args, _config: &RagConfig) -> Result<Arc<dyn VectorStore>> {
    bail!("built without the `atlas` feature")
}

#[cfg(feature = "qdrant")]
fn connect_qdrant(args: &Args, config: &RagConfig) -> Result<Arc<dyn VectorStore>> {
    let store = ragkit::QdrantVectorStore::new(
        &args.qdrant_url,
        args.collection.clone(),
        config.index.clone(),
    )
    .context("connecting to Qdrant")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "qdrant"))]
fn connect_qdrant(_args: &Args, _config: &RagConfig) -> Result<Arc<dyn VectorStore>> {
    bail!("built without the `qdrant` feature")
}

fn embedding_provider(args: &Args, config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match args.embedder {
        EmbedderKind::Hashing => {
            Ok(Arc::new(HashingEmbeddingProvider::new(config.index.dimension)?))
        }
        EmbedderKind::Openai => openai_embedder(args, config),
    }
}

#[cfg(feature = "openai")]
fn openai_config(args: &Args) -> Result<ragkit::OpenAIConfig> {
    let Some(key) = &args.openai_api_key else {
        bail!("--openai-api-key or OPENAI_API_KEY is required for OpenAI");
    };
    let mut config = ragkit::OpenAIConfig::new(key.clone());
    if let Some(model) = &args.embedding_model {
        config = config.with_embedding_model(model.clone());
    }
    if let Some(model) = &args.chat_model {
        config = config.with_chat_model(model.clone());
    }
    Ok(config)
}

#[cfg(feature = "openai")]
fn openai_embedder(args: &Args, config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let mut openai = openai_config(args)?;
    // Only shortened embeddings need the dimensions parameter.
    if config.index.dimension != ragkit::IndexDefinition::default().dimension {
        openai = openai.with_dimensions(config.index.dimension);
    }
    Ok(Arc::new(ragkit::OpenAIEmbeddingProvider::new(openai)?))
}

#[cfg(not(feature = "openai"))]
fn openai_embedder(_args: &Args, _config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    bail!("built without the `openai` feature; use --embedder hashing")
}

#[cfg(feature = "openai")]
fn language_model(args: &Args) -> Result<Arc<dyn LanguageModel>> {
    Ok(Arc::new(ragkit::OpenAIChatModel::new(openai_config(args)?)?))
}

#[cfg(not(feature = "openai"))]
fn language_model(_args: &Args) -> Result<Arc<dyn LanguageModel>> {
    bail!("answering questions requires the `openai` feature")
}

fn print_results(title: &str, results: &[SearchResult]) -> Result<()> {
    let rendered: Vec<_> = results
        .iter()
        .map(|r| {
            json!({
                "pageContent": r.chunk.text,
                "score": r.score,
                "metadata": r.chunk.metadata,
                "sourceOffset": {
                    "start": r.chunk.source_offset.start,
                    "end": r.chunk.source_offset.end,
                },
            })
        })
        .collect();
    println!("{title}:");
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}
