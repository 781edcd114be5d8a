//! Retrieval pipeline orchestrator.
//!
//! The [`RagPipeline`] owns the ingested chunks and the vector index built
//! from them. It is constructed empty, ingests its document folder exactly
//! once, and then answers queries concurrently through a shared reference.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kbase_rag::{HashEmbeddingProvider, RagConfig, RagPipeline};
//!
//! let mut pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .documents_dir("./docs")
//!     .build()?;
//!
//! pipeline.ingest().await?;
//! let pipeline = Arc::new(pipeline);
//! let results = pipeline.retrieve("how do refunds work?").await?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::chunking::FixedSizeChunker;
use crate::config::RagConfig;
use crate::document::{Chunk, RetrievalResult};
use crate::embedding::{EmbeddingProvider, EmbeddingVector};
use crate::error::{RagError, Result};
use crate::index::{FlatIndex, VectorIndex};
use crate::loader::load_documents;

/// Lifecycle of a [`RagPipeline`].
///
/// `Empty → Loading → Ready | Failed`. `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No ingestion has been attempted.
    Empty,
    /// Ingestion is in progress (or its future was dropped before finishing).
    Loading,
    /// The index is built and queries are accepted.
    Ready,
    /// Ingestion failed; no index is served.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a successful ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Documents read and chunked.
    pub documents: usize,
    /// Files passed over because of their extension.
    pub skipped_files: usize,
    /// Chunks embedded and indexed.
    pub chunks: usize,
    /// Dimensionality of the index, `None` when nothing was indexed.
    pub dimensions: Option<usize>,
}

/// The retrieval pipeline.
///
/// Ingestion (load → chunk → embed → index) requires exclusive access and
/// runs once. Once [`Ready`](PipelineState::Ready), the pipeline is
/// read-only and can be shared behind an [`Arc`] by any number of concurrent
/// callers of [`retrieve`](RagPipeline::retrieve). Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    documents_dir: PathBuf,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    chunker: FixedSizeChunker,
    state: PipelineState,
    failure: Option<String>,
    chunks: Vec<Chunk>,
    index: Box<dyn VectorIndex>,
}

impl fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("documents_dir", &self.documents_dir)
            .field("embedding_provider", &self.embedding_provider.name())
            .field("state", &self.state)
            .field("chunks", &self.chunks.len())
            .finish_non_exhaustive()
    }
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

    /// The folder ingested by [`ingest`](Self::ingest).
    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Whether queries are accepted.
    pub fn is_ready(&self) -> bool {
        self.state == PipelineState::Ready
    }

    /// The error message that moved the pipeline to
    /// [`Failed`](PipelineState::Failed), if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Ingested chunks in index order. Empty until ingestion succeeds.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The vector index. Empty until ingestion succeeds.
    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    /// Ingest the document folder: load → chunk → embed → index.
    ///
    /// All chunks are embedded in a single batch call. The pipeline only
    /// becomes [`Ready`](PipelineState::Ready) if every step succeeds; any
    /// failure leaves it [`Failed`](PipelineState::Failed) with no index.
    /// A folder without recognized documents yields a ready, empty index.
    ///
    /// # Errors
    ///
    /// - [`RagError::Pipeline`] if ingestion was already attempted
    /// - [`RagError::Io`] if the folder or a document cannot be read
    /// - [`RagError::Provider`] if embedding fails or returns malformed data,
    ///   including NaN or infinite components
    /// - [`RagError::DimensionMismatch`] if the provider mixes vector lengths
    pub async fn ingest(&mut self) -> Result<IngestReport> {
        if self.state != PipelineState::Empty {
            return Err(RagError::Pipeline(format!(
                "ingestion already attempted (state: {})",
                self.state
            )));
        }

        self.state = PipelineState::Loading;
        info!(folder = %self.documents_dir.display(), "ingesting documents");

        match self.load_and_index().await {
            Ok((chunks, index, report)) => {
                self.chunks = chunks;
                self.index = Box::new(index);
                self.state = PipelineState::Ready;
                info!(
                    documents = report.documents,
                    skipped_files = report.skipped_files,
                    chunk_count = report.chunks,
                    dimensions = ?report.dimensions,
                    "ingestion completed"
                );
                Ok(report)
            }
            Err(e) => {
                error!(folder = %self.documents_dir.display(), error = %e, "ingestion failed");
                self.state = PipelineState::Failed;
                self.failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn load_and_index(&self) -> Result<(Vec<Chunk>, FlatIndex, IngestReport)> {
        // 1. Read the folder off the async runtime
        let dir = self.documents_dir.clone();
        let config = self.config.clone();
        let loaded = tokio::task::spawn_blocking(move || load_documents(&dir, &config))
            .await
            .map_err(|e| RagError::Pipeline(format!("document loading task failed: {e}")))??;

        // 2. Chunk every document, numbering chunks globally
        let mut chunks = Vec::new();
        for document in &loaded.documents {
            let first_position = chunks.len();
            chunks.extend(self.chunker.chunk_document(document, first_position));
            debug!(
                document = %document.name,
                chunk_count = chunks.len() - first_position,
                "chunked document"
            );
        }

        let mut report = IngestReport {
            documents: loaded.documents.len(),
            skipped_files: loaded.skipped.len(),
            chunks: chunks.len(),
            dimensions: None,
        };
        drop(loaded);

        if chunks.is_empty() {
            info!("no chunks produced; knowledge base is empty");
            return Ok((chunks, FlatIndex::default(), report));
        }

        // 3. Embed all chunks in one batch
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedding_provider.embed_batch(&texts).await?;
        let vectors = self.check_embeddings(texts.len(), vectors)?;

        // 4. Build the index
        let index = FlatIndex::build(vectors)?;
        report.dimensions = index.dimensions();
        Ok((chunks, index, report))
    }

    /// Reject provider output that does not line up with the request, then
    /// apply the configured normalization.
    fn check_embeddings(
        &self,
        expected: usize,
        vectors: Vec<EmbeddingVector>,
    ) -> Result<Vec<EmbeddingVector>> {
        let provider = self.embedding_provider.name();
        if vectors.len() != expected {
            return Err(RagError::provider(
                provider,
                format!("returned {} embeddings for {expected} inputs", vectors.len()),
            ));
        }
        if vectors.iter().any(|v| v.dimensions() == 0) {
            return Err(RagError::provider(provider, "returned an empty embedding"));
        }
        if !vectors.iter().all(EmbeddingVector::is_finite) {
            return Err(RagError::provider(provider, "returned a non-finite embedding"));
        }
        Ok(vectors.into_iter().map(|v| self.prepare(v)).collect())
    }

    fn prepare(&self, vector: EmbeddingVector) -> EmbeddingVector {
        if self.config.normalize_embeddings { vector.normalized() } else { vector }
    }

    /// Retrieve snippets relevant to `query` using the configured `top_k`.
    ///
    /// See [`retrieve_with_top_k`](Self::retrieve_with_top_k).
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        self.retrieve_with_top_k(query, self.config.top_k).await
    }

    /// Retrieve up to `top_k` snippets relevant to `query`: embed → search →
    /// score → filter by threshold.
    ///
    /// Results are ordered by descending score. An empty list means nothing
    /// relevant was found (or the knowledge base is empty); it never stands
    /// in for a provider failure.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReady`] unless ingestion completed successfully
    /// - [`RagError::Provider`] if the query cannot be embedded or its
    ///   embedding contains NaN or infinite values
    /// - [`RagError::DimensionMismatch`] if the query embedding's length
    ///   differs from the index
    pub async fn retrieve_with_top_k(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if self.state != PipelineState::Ready {
            warn!(state = %self.state, "query rejected before ingestion completed");
            return Err(RagError::NotReady(self.state));
        }
        if self.index.is_empty() {
            debug!("query against empty knowledge base");
            return Ok(Vec::new());
        }

        // 1. Embed the query
        let query_vector = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;
        if !query_vector.is_finite() {
            error!("query embedding has non-finite components");
            return Err(RagError::provider(
                self.embedding_provider.name(),
                "returned a non-finite embedding",
            ));
        }
        let query_vector = self.prepare(query_vector);

        // 2. Search the index
        let neighbors = self.index.search(&query_vector, top_k)?;

        // 3. Score and filter by similarity threshold
        let threshold = self.config.similarity_threshold;
        let results = neighbors
            .into_iter()
            .filter(|n| n.score() >= threshold)
            .map(|n| {
                let chunk = self.chunks.get(n.position).ok_or_else(|| {
                    RagError::Pipeline(format!("index position {} has no chunk", n.position))
                })?;
                Ok(RetrievalResult {
                    text: chunk.text.clone(),
                    score: n.score(),
                    source: chunk.source.clone(),
                    position: chunk.position,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(result_count = results.len(), top_k, "query completed");
        Ok(results)
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider` and `documents_dir` are required; `config` defaults
/// to [`RagConfig::default()`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::builder().top_k(5).build()?)
///     .embedding_provider(Arc::new(embedder))
///     .documents_dir("./docs")
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    documents_dir: Option<PathBuf>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the folder holding the knowledge-base documents.
    pub fn documents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.documents_dir = Some(dir.into());
        self
    }

    /// Build an [`Empty`](PipelineState::Empty) [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let documents_dir = self
            .documents_dir
            .ok_or_else(|| RagError::Config("documents_dir is required".to_string()))?;
        let chunker = FixedSizeChunker::from_config(&config)?;

        Ok(RagPipeline {
            config,
            documents_dir,
            embedding_provider,
            chunker,
            state: PipelineState::Empty,
            failure: None,
            chunks: Vec::new(),
            index: Box::new(FlatIndex::default()),
        })
    }
}
