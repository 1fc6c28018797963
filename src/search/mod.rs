//! Hybrid retrieval: lexical BM25 + semantic vectors, fused by rank.
//!
//! Two probes run over the same chunk corpus. The lexical probe matches
//! exact terms through an immutable BM25 snapshot ([`lexical`]); the
//! semantic probe matches meaning through the vector store. Neither score
//! scale is comparable, so results are combined by Reciprocal Rank Fusion
//! ([`fusion`]), which only looks at ranks. [`expansion`] then widens each
//! fused hit with its index-adjacent neighbors for context assembly.

pub mod expansion;
pub mod fusion;
pub mod lexical;
pub mod retriever;
pub mod types;

pub use expansion::expand_with_neighbors;
pub use fusion::{reciprocal_rank_fusion, RRF_K};
pub use lexical::LexicalIndex;
pub use retriever::HybridRetriever;
pub use types::{ChunkKey, RetrievedChunk, ScoredChunk, SearchError};
