//! Data types for documents, chunks, and retrieval results.

use serde::{Deserialize, Serialize};

/// A source document read from the knowledge-base folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// The file name the document was read from. Acts as its identifier.
    pub name: String,
    /// The full UTF-8 text content of the document.
    pub text: String,
}

impl Document {
    /// Create a document from a file name and its text.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { name: name.into(), text: text.into() }
    }
}

/// An ingested segment of a [`Document`].
///
/// Chunks are retained by the pipeline after ingestion; the documents they
/// came from are not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Global sequence number across the whole ingestion. Equals the
    /// chunk's position in the vector index.
    pub position: usize,
    /// File name of the parent [`Document`].
    pub source: String,
    /// Index of the chunk within its parent document.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Length of `text` in characters.
    pub char_len: usize,
    /// Number of leading characters shared with the previous chunk of the
    /// same document. Zero for a document's first chunk.
    pub overlap: usize,
}

/// A retrieved snippet paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The snippet text.
    pub text: String,
    /// The similarity score (higher is more relevant).
    pub score: f32,
    /// File name of the document the snippet came from.
    pub source: String,
    /// Index position of the matching chunk.
    pub position: usize,
}

/// Join retrieved snippets into a grounding context for a downstream model.
///
/// Returns `None` when nothing passed the similarity threshold so callers can
/// fall back to an ungrounded prompt.
pub fn grounding_context(results: &[RetrievalResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    Some(results.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join("\n"))
}
