//! Hybrid retriever: concurrent semantic + lexical probes, fused by rank.

use super::fusion::reciprocal_rank_fusion;
use super::lexical::{tokenize, LexicalIndex};
use super::types::{ChunkKey, ScoredChunk, SearchError};
use crate::embedding::Embedder;
use crate::store::{VectorStore, VectorStoreError};
use futures::join;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Runs both retrieval branches over the chunk corpus and fuses them.
///
/// The semantic branch embeds the query and probes the vector store; the
/// lexical branch probes the BM25 snapshot. Each branch degrades to empty
/// on its own recoverable conditions rather than failing the search: a
/// token-free query skips the lexical branch, and a vector index that
/// cannot satisfy the requested depth is retried at half depth until the
/// request reaches one.
pub struct HybridRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    /// Optional cap on cosine distance for semantic hits
    max_distance: Option<f32>,
}

impl HybridRetriever {
    /// Creates a retriever over the given store and embedder.
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            max_distance: None,
        }
    }

    /// Drops semantic hits farther than `distance` from the query.
    pub fn with_max_distance(mut self, distance: f32) -> Self {
        self.max_distance = Some(distance);
        self
    }

    /// Hybrid search: fetch up to `fetch_k` candidates per branch, fuse,
    /// and return the top `k`.
    ///
    /// Returns an empty list when both branches come back empty; that is a
    /// normal outcome for an empty corpus or an unmatchable query, not an
    /// error.
    #[instrument(skip_all, fields(k, fetch_k))]
    pub async fn search(
        &self,
        lexical: &LexicalIndex,
        query: &str,
        k: usize,
        fetch_k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let (semantic, lexical_hits) = join!(
            self.semantic_probe(query, fetch_k),
            self.lexical_probe(lexical, query, fetch_k),
        );
        let semantic = semantic?;

        debug!(
            semantic = semantic.len(),
            lexical = lexical_hits.len(),
            "probes complete"
        );
        Ok(reciprocal_rank_fusion(&[&semantic, &lexical_hits], k))
    }

    /// Semantic branch: embed the query and probe the vector store.
    ///
    /// The requested depth is capped to the corpus size, then halved on
    /// each [`VectorStoreError::Degenerate`] response. A request of one
    /// that still cannot be satisfied surfaces an empty branch.
    async fn semantic_probe(
        &self,
        query: &str,
        fetch_k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        let stored = self.store.count().await?;
        let mut n = fetch_k.min(stored);
        if n == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(vector) = vectors.into_iter().next() else {
            return Ok(Vec::new());
        };

        let hits = loop {
            match self.store.query(&vector, n, None).await {
                Ok(hits) => break hits,
                Err(VectorStoreError::Degenerate { requested }) if n > 1 => {
                    n = (n / 2).max(1);
                    warn!(requested, retry_n = n, "vector index degenerate, halving");
                }
                Err(VectorStoreError::Degenerate { requested }) => {
                    warn!(requested, "vector index degenerate at n=1, empty branch");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e.into()),
            }
        };

        Ok(hits
            .into_iter()
            .filter(|hit| {
                self.max_distance
                    .map(|max| hit.distance <= max)
                    .unwrap_or(true)
            })
            .map(|hit| ScoredChunk {
                key: ChunkKey::for_chunk(&hit.id, &hit.text, hit.metadata.as_ref()),
                id: hit.id,
                text: hit.text,
                metadata: hit.metadata,
                score: 1.0 - hit.distance,
            })
            .collect())
    }

    /// Lexical branch: skipped entirely for token-free queries.
    async fn lexical_probe(
        &self,
        lexical: &LexicalIndex,
        query: &str,
        fetch_k: usize,
    ) -> Vec<ScoredChunk> {
        if tokenize(query).is_empty() {
            return Vec::new();
        }
        lexical.search(query, fetch_k)
    }
}
