//! Shared search types: chunk keys, scored hits, and search errors.

use crate::error::UpstreamError;
use crate::store::{ChunkMetadata, VectorStoreError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Identity under which chunks are deduplicated and fused.
///
/// Two retrieval branches can surface the same chunk; fusion must treat
/// those as one result. The key is the chunk's `(doc_id, chunk_index)`
/// identity whenever it can be resolved. Only a chunk with no metadata and
/// an unparseable id falls back to a hash of its text, so equal text in
/// two different documents never collapses into one result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkKey {
    /// Resolvable `(doc_id, chunk_index)` identity
    Identity {
        /// Owning document id
        doc_id: String,
        /// Chunk position within the document
        chunk_index: usize,
    },
    /// Fallback content hash for chunks without resolvable identity
    Content(u64),
}

impl ChunkKey {
    /// Derives the key for a chunk from its metadata, id, and text.
    ///
    /// Prefers the metadata record; failing that, parses the composite id
    /// (`"{doc_id}_{chunk_index}"`); failing both, hashes the text.
    pub fn for_chunk(id: &str, text: &str, metadata: Option<&ChunkMetadata>) -> Self {
        if let Some(meta) = metadata {
            return Self::Identity {
                doc_id: meta.doc_id.clone(),
                chunk_index: meta.chunk_index,
            };
        }
        if let Some((doc_id, index)) = id.rsplit_once('_') {
            if let Ok(chunk_index) = index.parse::<usize>() {
                return Self::Identity {
                    doc_id: doc_id.to_string(),
                    chunk_index,
                };
            }
        }
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        Self::Content(hasher.finish())
    }

    /// The `(doc_id, chunk_index)` pair, when this key carries one.
    pub fn identity(&self) -> Option<(&str, usize)> {
        match self {
            Self::Identity {
                doc_id,
                chunk_index,
            } => Some((doc_id.as_str(), *chunk_index)),
            Self::Content(_) => None,
        }
    }
}

/// A ranked chunk from one retrieval branch or from fusion.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Dedup/fusion key
    pub key: ChunkKey,
    /// Composite chunk id
    pub id: String,
    /// Chunk text
    pub text: String,
    /// Metadata record, when the store has one
    pub metadata: Option<ChunkMetadata>,
    /// Branch score before fusion, fused score after
    pub score: f32,
}

/// A chunk selected for context assembly.
///
/// Produced by neighbor expansion; neighbors pulled in for context carry no
/// score of their own.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// Composite chunk id
    pub id: String,
    /// Chunk text
    pub text: String,
    /// Metadata record, when the store has one
    pub metadata: Option<ChunkMetadata>,
}

/// Errors from retrieval operations.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// Vector store failure during a probe or neighbor fetch
    #[error("store error during search: {0}")]
    Store(#[from] VectorStoreError),
    /// Upstream embedding failure while embedding the query
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
