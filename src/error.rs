//! Cross-cutting error types.
//!
//! Component-local errors (vector store, registry, search) live next to the
//! components that produce them; this module holds the errors that cross
//! module boundaries: chunking configuration failures and upstream service
//! failures that must be surfaced to the caller unmodified.

use thiserror::Error;

/// Errors that can occur during text chunking.
#[derive(Debug, Clone, Error)]
pub enum ChunkingError {
    /// Invalid chunking configuration. Raised at construction, never mid-run.
    #[error("invalid chunking config: chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    InvalidConfig {
        /// Configured maximum chunk length in characters
        size: usize,
        /// Configured overlap length in characters
        overlap: usize,
    },
}

/// Failures from external model services.
///
/// The core never retries these; they propagate to the caller unmodified.
/// Bounding the underlying network calls (timeouts, cancellation) is the
/// caller's responsibility.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Embedding service call failed
    #[error("embedding service error: {0}")]
    Embedding(String),
    /// Generation service call failed
    #[error("generation service error: {0}")]
    Generation(String),
}
