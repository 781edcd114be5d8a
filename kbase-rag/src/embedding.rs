//! Embedding vectors and the provider trait that produces them.

use std::ops::Deref;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A fixed-length embedding produced for one chunk or one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wrap raw provider output.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Number of components.
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Borrow the components.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Unwrap into the raw components.
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Whether every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|x| x.is_finite())
    }

    /// Euclidean (L2) length.
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Rescale to unit length. A zero vector is returned unchanged.
    pub fn normalized(mut self) -> Self {
        let norm = self.norm();
        if norm > 0.0 {
            self.0.iter_mut().for_each(|x| *x /= norm);
        }
        self
    }

    /// Squared Euclidean distance to `other`.
    ///
    /// Callers must ensure both vectors have the same length; extra
    /// components of the longer one are ignored.
    pub fn squared_distance(&self, other: &[f32]) -> f32 {
        self.0
            .iter()
            .zip(other)
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum()
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl Deref for EmbeddingVector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl AsRef<[f32]> for EmbeddingVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. They must return exactly one vector per input, in input order,
/// all with the same dimensionality, and must report failures as
/// [`RagError::Provider`](crate::RagError::Provider) rather than returning
/// placeholder vectors.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use kbase_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs and error messages.
    fn name(&self) -> &str {
        "custom"
    }

    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// A deterministic, offline [`EmbeddingProvider`] based on feature hashing.
///
/// Each lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets with a hash-derived sign, and the resulting vector is scaled to
/// unit length. Texts that share vocabulary land close together, which is
/// enough for demos and tests without network access. Text with no tokens
/// embeds to the zero vector.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    /// Create a provider producing vectors of the given length.
    ///
    /// A length of zero is bumped to one so every vector is non-empty.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    /// Length of the produced vectors.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_sync(&self, text: &str) -> EmbeddingVector {
        let mut values = vec![0.0f32; self.dimensions];
        let tokens = text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty());
        for token in tokens {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
        }
        EmbeddingVector::new(values).normalized()
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

/// 64-bit FNV-1a. Stable across platforms and releases, unlike `DefaultHasher`.
fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |acc, b| {
        (acc ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}
