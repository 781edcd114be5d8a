//! Command-line arguments.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use kbase_rag::{
    EmbeddingProvider, HashEmbeddingProvider, OpenAIEmbeddingProvider, RagConfig,
};

/// Query a folder of private text documents by semantic similarity.
#[derive(Debug, Parser)]
#[command(name = "kbase", version, about)]
pub struct Cli {
    /// Folder holding the knowledge-base documents.
    #[arg(long, short = 'd', env = "KBASE_DOCS_DIR", default_value = "docs", global = true)]
    pub docs: PathBuf,

    #[command(flatten)]
    pub index: IndexArgs,

    #[command(flatten)]
    pub embedder: EmbedderArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Chunking and retrieval settings.
#[derive(Debug, Clone, Args)]
pub struct IndexArgs {
    /// Maximum chunk size in characters.
    #[arg(long, default_value_t = 512, global = true)]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, default_value_t = 50, global = true)]
    pub chunk_overlap: usize,

    /// Nearest neighbours fetched per query.
    #[arg(long, short = 'k', default_value_t = 3, global = true)]
    pub top_k: usize,

    /// Minimum similarity score for a snippet to be returned.
    #[arg(long, default_value_t = 0.75, global = true)]
    pub threshold: f32,

    /// Recognized document extension; repeat to accept several.
    #[arg(long = "extension", default_value = "txt", global = true)]
    pub extensions: Vec<String>,

    /// Rescale embeddings to unit length before indexing and searching.
    #[arg(long, global = true)]
    pub normalize: bool,
}

impl IndexArgs {
    /// Map the flags onto a validated [`RagConfig`].
    pub fn rag_config(&self) -> kbase_rag::Result<RagConfig> {
        RagConfig::builder()
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .top_k(self.top_k)
            .similarity_threshold(self.threshold)
            .extensions(&self.extensions)
            .normalize_embeddings(self.normalize)
            .build()
    }
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// The OpenAI embeddings API (needs `OPENAI_API_KEY`).
    Openai,
    /// Offline feature hashing; deterministic, no network.
    Hash,
}

/// Embedding backend settings.
#[derive(Debug, Clone, Args)]
pub struct EmbedderArgs {
    /// Embedding backend.
    #[arg(long, value_enum, env = "KBASE_EMBEDDER", default_value = "openai", global = true)]
    pub embedder: EmbedderKind,

    /// OpenAI embedding model.
    #[arg(long, env = "KBASE_EMBEDDING_MODEL", global = true)]
    pub model: Option<String>,

    /// Requested embedding length (OpenAI Matryoshka truncation, or the hash
    /// embedder's vector length).
    #[arg(long, global = true)]
    pub dimensions: Option<usize>,

    /// Base URL of an OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", global = true)]
    pub base_url: Option<String>,
}

impl EmbedderArgs {
    /// Construct the selected provider.
    pub fn provider(&self) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        match self.embedder {
            EmbedderKind::Hash => {
                let dims = self.dimensions.unwrap_or(HashEmbeddingProvider::default().dimensions());
                Ok(Arc::new(HashEmbeddingProvider::new(dims)))
            }
            EmbedderKind::Openai => {
                let mut provider = OpenAIEmbeddingProvider::from_env()
                    .context("OpenAI embedder selected; set OPENAI_API_KEY or use --embedder hash")?;
                if let Some(model) = &self.model {
                    provider = provider.with_model(model);
                }
                if let Some(dims) = self.dimensions {
                    provider = provider.with_dimensions(dims);
                }
                if let Some(url) = &self.base_url {
                    provider = provider.with_base_url(url);
                }
                Ok(Arc::new(provider))
            }
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk the document folder and list the chunks, without embedding.
    Chunks,
    /// Ingest the folder and answer a single query.
    Query {
        /// The natural-language query.
        text: String,
        /// Print results as JSON.
        #[arg(long)]
        json: bool,
        /// Print the joined grounding context instead of a ranked list.
        #[arg(long, conflicts_with = "json")]
        context: bool,
    },
    /// Ingest the folder once, then answer queries read from the terminal.
    Repl,
}
