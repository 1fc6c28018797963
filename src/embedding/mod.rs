//! Embedding service boundary.
//!
//! The core consumes embeddings through the [`Embedder`] trait and never
//! talks to a model directly. Production deployments back this with a remote
//! embedding service or a local model; [`HashEmbedder`] provides a
//! deterministic, dependency-free implementation for tests and offline use.

use crate::error::UpstreamError;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Produces dense vectors for text.
///
/// Implementations own batching, device placement, and transport concerns.
/// Failures surface as [`UpstreamError::Embedding`] and are propagated to
/// the caller unmodified; the core does not retry upstream calls.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError>;

    /// Dimensionality of the vectors this embedder produces.
    fn dimension(&self) -> usize;
}

/// Deterministic bag-of-words embedder using token hashing.
///
/// Each lowercase token is hashed into one of `dimension` buckets; the
/// resulting count vector is L2-normalized. Texts sharing vocabulary land
/// close in cosine space, which is enough for exercising the retrieval
/// stack without model weights.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Creates a hash embedder producing vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0.0f32; self.dimension];
        for token in crate::search::lexical::tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            buckets[bucket] += 1.0;
        }

        let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut buckets {
                *value /= norm;
            }
        }
        buckets
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, UpstreamError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
