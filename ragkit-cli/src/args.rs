use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "ragkit",
    version,
    about = "Ingest a document, search it, and answer a question from it"
)]
pub struct Args {
    /// Document to ingest: an http(s) URL or a local path
    pub locator: String,

    /// Text used for the similarity and MMR searches
    #[arg(short, long)]
    pub query: String,

    /// Question answered from the retrieved context
    #[arg(long)]
    pub question: Option<String>,

    /// Also write the fetched bytes to this file
    #[arg(long)]
    pub save_to: Option<PathBuf>,

    /// JSON file holding a RagConfig; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub chunk_size: Option<usize>,

    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Name of the vector index to declare and wait for
    #[arg(long)]
    pub index_name: Option<String>,

    #[arg(long, value_enum, default_value_t = StoreKind::Atlas)]
    pub store: StoreKind,

    #[arg(long, value_enum, default_value_t = EmbedderKind::Openai)]
    pub embedder: EmbedderKind,

    #[arg(long, env = "ATLAS_CONNECTION_STRING", hide_env_values = true)]
    pub atlas_uri: Option<String>,

    #[arg(long, default_value = "langchain_db")]
    pub database: String,

    #[arg(long, default_value = "test")]
    pub collection: String,

    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6334")]
    pub qdrant_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Override the embedding model name
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// Override the chat model name
    #[arg(long)]
    pub chat_model: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Process-local store; nothing persists after exit
    Memory,
    Atlas,
    Qdrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Offline bag-of-words hashing
    Hashing,
    Openai,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_follow_the_atlas_flow() {
        let args = Args::try_parse_from(["ragkit", "doc.txt", "--query", "security"]).unwrap();
        assert_eq!(args.store, StoreKind::Atlas);
        assert_eq!(args.embedder, EmbedderKind::Openai);
        assert_eq!(args.database, "langchain_db");
        assert_eq!(args.collection, "test");
        assert!(args.question.is_none());
    }

    #[test]
    fn offline_backends_parse() {
        let args = Args::try_parse_from([
            "ragkit",
            "doc.txt",
            "-q",
            "x",
            "--store",
            "memory",
            "--embedder",
            "hashing",
            "--chunk-size",
            "300",
        ])
        .unwrap();
        assert_eq!(args.store, StoreKind::Memory);
        assert_eq!(args.embedder, EmbedderKind::Hashing);
        assert_eq!(args.chunk_size, Some(300));
    }
}
