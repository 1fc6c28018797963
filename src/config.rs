//! Production configuration constants.
//!
//! These values define the default retrieval and chunking configuration and
//! are used throughout the crate and in tests to ensure consistency.

/// Default maximum chunk length in characters.
///
/// Chunks are sized to fit within this limit while preserving word and
/// sentence boundaries. The actual length may be slightly lower due to
/// boundary alignment.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap carried from the end of one chunk into the next, in
/// characters.
///
/// The overlap tail is extended forward to the next whitespace boundary, so
/// the effective overlap is at most this many characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Default number of fused results returned by a hybrid search.
pub const DEFAULT_TOP_K: usize = 16;

/// Default candidate depth requested from each retrieval branch before
/// fusion.
///
/// Both the semantic and the lexical probe fetch up to this many candidates;
/// fusion then narrows to the requested `k`.
pub const DEFAULT_FETCH_K: usize = 20;

/// Default result budget for retrieval with neighbor expansion.
pub const DEFAULT_RETRIEVE_K: usize = 16;

/// How many index-adjacent chunks to pull on each side of a matched chunk
/// during context expansion.
pub const NEIGHBOR_RADIUS: usize = 2;
