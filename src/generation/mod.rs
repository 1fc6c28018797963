//! Generative model boundary.
//!
//! Answer generation is an external capability, consumed through
//! [`GenerativeModel`]. Implementations wrap whatever backend is in use
//! (hosted API, local model); failures surface as
//! [`UpstreamError::Generation`] and are propagated unmodified.

use crate::error::UpstreamError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Token stream from a streaming generation call.
///
/// Each item is a text fragment; fragments concatenate to the full answer.
pub type TokenStream = BoxStream<'static, Result<String, UpstreamError>>;

/// Produces answers from prompts.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Generates a complete answer for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;

    /// Generates an answer as a stream of text fragments.
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, UpstreamError>;
}
