//! Document chunking.
//!
//! [`FixedSizeChunker`] splits text into windows of at most `chunk_size`
//! characters, where each window after the first repeats the last
//! `chunk_overlap` characters of its predecessor. Sizes are counted in
//! `char`s so multi-byte text is never cut inside a code point.

use std::iter::FusedIterator;

use crate::config::RagConfig;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Splits text into fixed-size, overlapping chunks by character count.
///
/// # Example
///
/// ```rust
/// use kbase_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(4, 1).unwrap();
/// let parts: Vec<&str> = chunker.split("abcdefg").map(|c| c.text).collect();
/// assert_eq!(parts, ["abcd", "defg"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk
    /// * `chunk_overlap` — number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] unless `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker from the sizes in a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Lazily split `text` into chunks, left to right.
    ///
    /// The returned iterator is cheap to clone; cloning it (or calling
    /// `split` again) restarts the sequence and yields identical chunks.
    pub fn split<'a>(&self, text: &'a str) -> TextChunks<'a> {
        TextChunks {
            text,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            start: 0,
            index: 0,
            done: text.is_empty(),
        }
    }

    /// Split a document into owned [`Chunk`]s whose positions start at
    /// `first_position`.
    pub fn chunk_document<'a>(
        &self,
        document: &'a Document,
        first_position: usize,
    ) -> impl Iterator<Item = Chunk> + 'a {
        self.split(&document.text).map(move |piece| Chunk {
            position: first_position + piece.index,
            source: document.name.clone(),
            index: piece.index,
            text: piece.text.to_string(),
            char_len: piece.char_len,
            overlap: piece.overlap,
        })
    }
}

/// A borrowed chunk produced by [`TextChunks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunk<'a> {
    /// Zero-based index within the split text.
    pub index: usize,
    /// The chunk's slice of the source text.
    pub text: &'a str,
    /// Length of `text` in characters.
    pub char_len: usize,
    /// Characters shared with the previous chunk.
    pub overlap: usize,
}

/// Iterator over the chunks of one text. See [`FixedSizeChunker::split`].
#[derive(Debug, Clone)]
pub struct TextChunks<'a> {
    text: &'a str,
    chunk_size: usize,
    chunk_overlap: usize,
    /// Byte offset where the next chunk begins.
    start: usize,
    index: usize,
    done: bool,
}

impl<'a> Iterator for TextChunks<'a> {
    type Item = TextChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let rest = &self.text[self.start..];
        let index = self.index;
        let overlap = if index == 0 { 0 } else { self.chunk_overlap };

        match rest.char_indices().nth(self.chunk_size) {
            // The remainder fits in one chunk.
            None => {
                self.done = true;
                Some(TextChunk { index, text: rest, char_len: rest.chars().count(), overlap })
            }
            Some((end, _)) => {
                let piece = &rest[..end];
                let step = self.chunk_size - self.chunk_overlap;
                let advance = piece.char_indices().nth(step).map_or(end, |(offset, _)| offset);
                self.start += advance;
                self.index += 1;
                Some(TextChunk { index, text: piece, char_len: self.chunk_size, overlap })
            }
        }
    }
}

impl FusedIterator for TextChunks<'_> {}
