//! Neighbor expansion of fused search hits.
//!
//! Chunking cuts documents into windows, so the sentence that answers a
//! question often straddles a chunk boundary. Expansion widens each fused
//! hit with its index-adjacent neighbors (the chunks cut immediately before
//! and after it in the same document), pulled from the store by composite
//! id. Ordering is hit-major: a hit is emitted, then its neighbors, then
//! the next hit, so the strongest match always leads its context.

use super::types::{ChunkKey, RetrievedChunk, ScoredChunk, SearchError};
use crate::store::{composite_id, VectorStore};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Expands fused hits with neighbors at `chunk_index ± 1 .. ± radius`.
///
/// Each chunk key is emitted at most once across the whole result, whether
/// it arrived as a hit or as a neighbor. Neighbor indices below zero are
/// skipped, and ids with no stored chunk are silently absent. A hit whose
/// identity cannot be resolved is emitted alone, with no neighbor lookup.
#[instrument(skip_all, fields(hits = hits.len(), radius))]
pub async fn expand_with_neighbors(
    store: &dyn VectorStore,
    hits: &[ScoredChunk],
    radius: usize,
) -> Result<Vec<RetrievedChunk>, SearchError> {
    let mut seen: HashSet<ChunkKey> = HashSet::new();
    let mut expanded: Vec<RetrievedChunk> = Vec::new();

    for hit in hits {
        if seen.insert(hit.key.clone()) {
            expanded.push(RetrievedChunk {
                id: hit.id.clone(),
                text: hit.text.clone(),
                metadata: hit.metadata.clone(),
            });
        }

        let Some((doc_id, chunk_index)) = hit.key.identity() else {
            continue;
        };

        // Ascending index order: index - radius .. index + radius.
        let low = chunk_index.saturating_sub(radius);
        let neighbor_ids: Vec<String> = (low..=chunk_index + radius)
            .filter(|&i| i != chunk_index)
            .map(|i| composite_id(doc_id, i))
            .collect();

        for payload in store.get(&neighbor_ids).await? {
            let key = ChunkKey::for_chunk(&payload.id, &payload.text, payload.metadata.as_ref());
            if seen.insert(key) {
                expanded.push(RetrievedChunk {
                    id: payload.id,
                    text: payload.text,
                    metadata: payload.metadata,
                });
            }
        }
    }

    debug!(expanded = expanded.len(), "neighbor expansion complete");
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkMetadata, InMemoryVectorStore, StoredChunk};

    fn stored(doc_id: &str, index: usize, text: &str) -> StoredChunk {
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
            embedding: vec![0.0],
        }
    }

    fn hit(doc_id: &str, index: usize, text: &str) -> ScoredChunk {
        ScoredChunk {
            key: ChunkKey::Identity {
                doc_id: doc_id.to_string(),
                chunk_index: index,
            },
            id: composite_id(doc_id, index),
            text: text.to_string(),
            metadata: None,
            score: 1.0,
        }
    }

    async fn seeded(doc_id: &str, n: usize) -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        let chunks: Vec<StoredChunk> = (0..n)
            .map(|i| stored(doc_id, i, &format!("chunk {i}")))
            .collect();
        store.upsert(chunks).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_hit_then_neighbors_in_ascending_order() {
        let store = seeded("doc", 7).await;
        let hits = vec![hit("doc", 3, "chunk 3")];

        let expanded = expand_with_neighbors(&store, &hits, 2).await.unwrap();
        let ids: Vec<&str> = expanded.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["doc_3", "doc_1", "doc_2", "doc_4", "doc_5"]);
    }

    #[tokio::test]
    async fn test_negative_neighbor_indices_skipped() {
        let store = seeded("doc", 4).await;
        let hits = vec![hit("doc", 0, "chunk 0")];

        let expanded = expand_with_neighbors(&store, &hits, 2).await.unwrap();
        let ids: Vec<&str> = expanded.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["doc_0", "doc_1", "doc_2"]);
    }

    #[tokio::test]
    async fn test_missing_neighbors_silently_absent() {
        let store = seeded("doc", 2).await;
        let hits = vec![hit("doc", 1, "chunk 1")];

        let expanded = expand_with_neighbors(&store, &hits, 2).await.unwrap();
        let ids: Vec<&str> = expanded.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["doc_1", "doc_0"]);
    }

    #[tokio::test]
    async fn test_no_key_emitted_twice() {
        let store = seeded("doc", 6).await;
        // Adjacent hits: each is the other's neighbor.
        let hits = vec![hit("doc", 2, "chunk 2"), hit("doc", 3, "chunk 3")];

        let expanded = expand_with_neighbors(&store, &hits, 2).await.unwrap();
        let ids: Vec<&str> = expanded.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["doc_2", "doc_0", "doc_1", "doc_3", "doc_4", "doc_5"]);

        let unique: HashSet<&&str> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[tokio::test]
    async fn test_content_key_hit_gets_no_neighbor_lookup() {
        let store = seeded("doc", 3).await;
        let anonymous = ScoredChunk {
            key: ChunkKey::Content(42),
            id: "opaque".to_string(),
            text: "anonymous chunk".to_string(),
            metadata: None,
            score: 1.0,
        };

        let expanded = expand_with_neighbors(&store, &[anonymous], 2).await.unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].id, "opaque");
    }

    #[tokio::test]
    async fn test_zero_radius_emits_hits_only() {
        let store = seeded("doc", 5).await;
        let hits = vec![hit("doc", 2, "chunk 2")];
        let expanded = expand_with_neighbors(&store, &hits, 0).await.unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].id, "doc_2");
    }
}
