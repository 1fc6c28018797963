//! Vector store boundary and the authoritative chunk store.
//!
//! The nearest-neighbor index is an external capability consumed through the
//! [`VectorStore`] trait; its internals (HNSW parameters, persistence,
//! locking) are its own concern. The store is also the authoritative home of
//! chunk text and metadata: the lexical index is derived from it and rebuilt
//! wholesale after every mutation.
//!
//! Chunks are addressed by composite id `"{doc_id}_{chunk_index}"`, which is
//! what makes targeted neighbor lookup and prefix deletion possible.
//!
//! [`InMemoryVectorStore`] is a brute-force cosine implementation suitable
//! for tests and small corpora.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Fixed metadata record attached to every stored chunk.
///
/// Replaces the open-ended metadata dictionaries of ad-hoc vector store
/// clients: every field the retrieval stack relies on is typed and present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Owning document id
    pub doc_id: String,
    /// 0-based position of this chunk within the document
    pub chunk_index: usize,
    /// Human-readable document name for citations
    pub document_name: String,
    /// 1-based page the chunk was cut from (1 for non-paged sources)
    pub page_number: u32,
    /// Source URL when the document was loaded from the web
    pub url: Option<String>,
}

/// A chunk as written to the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Composite id, `"{doc_id}_{chunk_index}"`
    pub id: String,
    /// Chunk text, stored verbatim
    pub text: String,
    /// Full metadata record
    pub metadata: ChunkMetadata,
    /// Embedding vector (owned by the index once upserted)
    pub embedding: Vec<f32>,
}

/// A chunk as read back from the store, without its embedding.
///
/// `metadata` is optional at this boundary: an external store may hold rows
/// written before the fixed record existed. Everything written through this
/// crate carries full metadata.
#[derive(Debug, Clone)]
pub struct ChunkPayload {
    /// Composite id
    pub id: String,
    /// Chunk text
    pub text: String,
    /// Metadata record, when the store has one
    pub metadata: Option<ChunkMetadata>,
}

/// A nearest-neighbor match returned by [`VectorStore::query`].
#[derive(Debug, Clone)]
pub struct QueryHit {
    /// Composite id
    pub id: String,
    /// Chunk text
    pub text: String,
    /// Metadata record, when the store has one
    pub metadata: Option<ChunkMetadata>,
    /// Distance from the query vector (smaller is closer)
    pub distance: f32,
}

/// Equality-only metadata filter for vector queries.
///
/// A `None` field matches everything; a `Some` field must match exactly.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    /// Restrict matches to one document
    pub doc_id: Option<String>,
    /// Restrict matches to one page
    pub page_number: Option<u32>,
}

impl MetadataFilter {
    /// Returns true if the chunk's metadata satisfies every set field.
    pub fn matches(&self, metadata: Option<&ChunkMetadata>) -> bool {
        let Some(meta) = metadata else {
            return self.doc_id.is_none() && self.page_number.is_none();
        };
        if let Some(doc_id) = &self.doc_id {
            if &meta.doc_id != doc_id {
                return false;
            }
        }
        if let Some(page) = self.page_number {
            if meta.page_number != page {
                return false;
            }
        }
        true
    }
}

/// Three-way failure classification for vector store operations.
///
/// The lifecycle manager's recreate-and-retry policy and the retriever's
/// halve-and-retry policy are explicit branches over these variants, not
/// caught-and-ignored exceptions.
#[derive(Debug, Clone, Error)]
pub enum VectorStoreError {
    /// Underlying index is uninitialized or corrupt (common on an empty or
    /// freshly-reset store). Recoverable once via recreate-and-retry.
    #[error("vector index uninitialized or corrupt: {0}")]
    Transient(String),
    /// The index cannot satisfy a query of this size under its internal
    /// parameters. The retriever halves the requested count and retries.
    #[error("vector index cannot satisfy a query for {requested} results")]
    Degenerate {
        /// Result count that was requested
        requested: usize,
    },
    /// Unrecoverable store failure.
    #[error("vector store failure: {0}")]
    Fatal(String),
}

/// Formats the composite chunk id for a `(doc_id, chunk_index)` identity.
pub fn composite_id(doc_id: &str, chunk_index: usize) -> String {
    format!("{doc_id}_{chunk_index}")
}

/// The id prefix shared by every chunk of a document.
pub fn doc_id_prefix(doc_id: &str) -> String {
    format!("{doc_id}_")
}

/// External nearest-neighbor index with attached chunk payloads.
///
/// Implementations decide their own concurrency and durability; this core
/// only requires that each operation is self-contained and that failures
/// are reported through [`VectorStoreError`].
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces chunks by id.
    async fn upsert(&self, chunks: Vec<StoredChunk>) -> Result<(), VectorStoreError>;

    /// Returns up to `n` nearest chunks, ascending by distance.
    async fn query(
        &self,
        vector: &[f32],
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, VectorStoreError>;

    /// Fetches chunks by composite id.
    ///
    /// Results follow the input id order; ids with no stored chunk are
    /// skipped, not errors.
    async fn get(&self, ids: &[String]) -> Result<Vec<ChunkPayload>, VectorStoreError>;

    /// Deletes chunks by composite id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<(), VectorStoreError>;

    /// Returns every stored chunk payload, in insertion order.
    ///
    /// Used for lexical index rebuilds and doc-id prefix scans.
    async fn all(&self) -> Result<Vec<ChunkPayload>, VectorStoreError>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize, VectorStoreError>;

    /// Drops and recreates the underlying index structure.
    ///
    /// Invoked once by the lifecycle manager when an operation reports
    /// [`VectorStoreError::Transient`].
    async fn reset(&self) -> Result<(), VectorStoreError>;
}

/// Brute-force cosine-distance store kept in memory.
///
/// Rows are held in insertion order so derived structures (lexical index,
/// prefix scans) see a stable view. Queries compare against every row,
/// which is fine at test and small-corpus scale.
#[derive(Default)]
pub struct InMemoryVectorStore {
    rows: RwLock<Vec<StoredChunk>>,
}

impl InMemoryVectorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_rows(&self) -> std::sync::RwLockReadGuard<'_, Vec<StoredChunk>> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_rows(&self) -> std::sync::RwLockWriteGuard<'_, Vec<StoredChunk>> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cosine distance (`1 - cosine similarity`), the distance convention used
/// by the production store this mirrors.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, chunks: Vec<StoredChunk>) -> Result<(), VectorStoreError> {
        for chunk in &chunks {
            let expected = composite_id(&chunk.metadata.doc_id, chunk.metadata.chunk_index);
            if chunk.id != expected {
                return Err(VectorStoreError::Fatal(format!(
                    "chunk id {:?} does not match metadata identity {:?}",
                    chunk.id, expected
                )));
            }
        }

        let mut rows = self.write_rows();
        for chunk in chunks {
            match rows.iter_mut().find(|row| row.id == chunk.id) {
                Some(existing) => *existing = chunk,
                None => rows.push(chunk),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, VectorStoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let rows = self.read_rows();
        let mut hits: Vec<QueryHit> = rows
            .iter()
            .filter(|row| {
                filter
                    .map(|f| f.matches(Some(&row.metadata)))
                    .unwrap_or(true)
            })
            .map(|row| QueryHit {
                id: row.id.clone(),
                text: row.text.clone(),
                metadata: Some(row.metadata.clone()),
                distance: cosine_distance(vector, &row.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n);
        Ok(hits)
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ChunkPayload>, VectorStoreError> {
        let rows = self.read_rows();
        Ok(ids
            .iter()
            .filter_map(|id| {
                rows.iter().find(|row| &row.id == id).map(|row| ChunkPayload {
                    id: row.id.clone(),
                    text: row.text.clone(),
                    metadata: Some(row.metadata.clone()),
                })
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), VectorStoreError> {
        let mut rows = self.write_rows();
        rows.retain(|row| !ids.contains(&row.id));
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ChunkPayload>, VectorStoreError> {
        let rows = self.read_rows();
        Ok(rows
            .iter()
            .map(|row| ChunkPayload {
                id: row.id.clone(),
                text: row.text.clone(),
                metadata: Some(row.metadata.clone()),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.read_rows().len())
    }

    async fn reset(&self) -> Result<(), VectorStoreError> {
        self.write_rows().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(doc_id: &str, index: usize, text: &str, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            id: composite_id(doc_id, index),
            text: text.to_string(),
            metadata: ChunkMetadata {
                doc_id: doc_id.to_string(),
                chunk_index: index,
                document_name: format!("{doc_id}.txt"),
                page_number: 1,
                url: None,
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_upsert_then_get_round_trip() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![chunk("doc", 0, "hello world", vec![1.0, 0.0])])
            .await
            .unwrap();

        let payloads = store.get(&[composite_id("doc", 0)]).await.unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].text, "hello world");
        assert_eq!(
            payloads[0].metadata.as_ref().unwrap().chunk_index,
            0
        );
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![chunk("doc", 0, "old", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(vec![chunk("doc", 0, "new", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let payloads = store.get(&[composite_id("doc", 0)]).await.unwrap();
        assert_eq!(payloads[0].text, "new");
    }

    #[tokio::test]
    async fn test_upsert_rejects_mismatched_identity() {
        let store = InMemoryVectorStore::new();
        let mut bad = chunk("doc", 0, "text", vec![1.0]);
        bad.id = "other_7".to_string();
        let err = store.upsert(vec![bad]).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_query_orders_by_distance_ascending() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                chunk("doc", 0, "far", vec![0.0, 1.0]),
                chunk("doc", 1, "near", vec![1.0, 0.0]),
                chunk("doc", 2, "middle", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 3, None).await.unwrap();
        assert_eq!(hits[0].text, "near");
        assert_eq!(hits[1].text, "middle");
        assert_eq!(hits[2].text, "far");
        assert!(hits[0].distance <= hits[1].distance);
        assert!(hits[1].distance <= hits[2].distance);
    }

    #[tokio::test]
    async fn test_query_applies_equality_filter() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                chunk("a", 0, "from a", vec![1.0, 0.0]),
                chunk("b", 0, "from b", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let filter = MetadataFilter {
            doc_id: Some("b".to_string()),
            page_number: None,
        };
        let hits = store.query(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "from b");
    }

    #[tokio::test]
    async fn test_get_skips_missing_ids() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![chunk("doc", 0, "present", vec![1.0])])
            .await
            .unwrap();

        let payloads = store
            .get(&[
                composite_id("doc", 5),
                composite_id("doc", 0),
                composite_id("other", 0),
            ])
            .await
            .unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].text, "present");
    }

    #[tokio::test]
    async fn test_delete_then_reset() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                chunk("doc", 0, "one", vec![1.0]),
                chunk("doc", 1, "two", vec![1.0]),
            ])
            .await
            .unwrap();

        store.delete(&[composite_id("doc", 0)]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.all().await.unwrap().is_empty());
    }

    #[test]
    fn test_composite_id_format() {
        assert_eq!(composite_id("abc", 4), "abc_4");
        assert_eq!(doc_id_prefix("abc"), "abc_");
    }
}
