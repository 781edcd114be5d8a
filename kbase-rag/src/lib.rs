//! Retrieval index for grounding generated answers in private documents.
//!
//! This crate provides:
//! - Fixed-size, overlapping character chunking ([`FixedSizeChunker`])
//! - The [`EmbeddingProvider`] seam, with an offline [`HashEmbeddingProvider`]
//!   and an OpenAI client behind the `openai` feature
//! - An exhaustive squared-Euclidean [`FlatIndex`] behind [`VectorIndex`]
//! - The [`RagPipeline`], which ingests a folder once and then answers
//!   threshold-gated similarity queries
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kbase_rag::{HashEmbeddingProvider, RagPipeline, grounding_context};
//!
//! let mut pipeline = RagPipeline::builder()
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .documents_dir("docs")
//!     .build()?;
//! pipeline.ingest().await?;
//!
//! let results = pipeline.retrieve("What is the refund window?").await?;
//! if let Some(context) = grounding_context(&results) {
//!     println!("{context}");
//! }
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod loader;
pub mod pipeline;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{FixedSizeChunker, TextChunk, TextChunks};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, RetrievalResult, grounding_context};
pub use embedding::{EmbeddingProvider, EmbeddingVector, HashEmbeddingProvider};
pub use error::{RagError, Result};
pub use index::{FlatIndex, Neighbor, VectorIndex, score_from_distance};
pub use loader::{LoadedFolder, load_documents};
pub use pipeline::{IngestReport, PipelineState, RagPipeline, RagPipelineBuilder};

#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
