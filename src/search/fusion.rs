//! Reciprocal Rank Fusion (RRF) of the two retrieval branches.
//!
//! BM25 scores and cosine distances live on incomparable scales, so fusion
//! ignores raw scores entirely and combines by rank position: a chunk at
//! 0-based rank `r` in a branch contributes `1 / (K + r)` to its fused
//! score, summed across branches. Chunks surfaced by both branches
//! therefore rank above chunks surfaced by one.

use super::types::{ChunkKey, ScoredChunk};
use std::collections::HashMap;
use tracing::debug;

/// Rank-smoothing constant from the original RRF paper.
///
/// Larger values flatten the difference between adjacent ranks.
pub const RRF_K: f32 = 60.0;

/// Fuses ranked result lists into one list ordered by fused score.
///
/// Lists are merged in the order given; the first list to surface a chunk
/// key supplies its id, text, and metadata. The output is sorted descending
/// by fused score with a stable sort, so ties keep merge-insertion order
/// (earlier list first, then rank order within a list). Passing two empty
/// lists yields an empty result.
pub fn reciprocal_rank_fusion(lists: &[&[ScoredChunk]], k: usize) -> Vec<ScoredChunk> {
    let mut order: Vec<ScoredChunk> = Vec::new();
    let mut slots: HashMap<ChunkKey, usize> = HashMap::new();

    for list in lists {
        for (rank, chunk) in list.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + rank as f32);
            match slots.get(&chunk.key) {
                Some(&slot) => order[slot].score += contribution,
                None => {
                    slots.insert(chunk.key.clone(), order.len());
                    order.push(ScoredChunk {
                        score: contribution,
                        ..chunk.clone()
                    });
                }
            }
        }
    }

    order.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(k);
    debug!(fused = order.len(), "rank fusion complete");
    order
}
