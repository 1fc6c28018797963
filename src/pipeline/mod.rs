//! Question-answering facade: retrieve, assemble context, generate.
//!
//! [`RagPipeline`] wires the knowledge base to a [`GenerativeModel`].
//! Retrieved chunks are rendered into citation-ready context blocks; the
//! model is instructed to ground its answer in those blocks and cite the
//! document name and page. Retrieval uses only the current question; chat
//! history is passed to the model for conversational continuity, never to
//! the retriever.

use crate::generation::{GenerativeModel, TokenStream};
use crate::knowledge::{KnowledgeBase, KnowledgeBaseError};
use crate::search::RetrievedChunk;
use crate::error::UpstreamError;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// How many trailing history turns are included in the prompt.
const HISTORY_WINDOW: usize = 10;

/// One prior turn of the conversation.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Speaker of this turn
    pub role: ChatRole,
    /// Turn text
    pub content: String,
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// The person asking questions
    User,
    /// The answering model
    Assistant,
}

/// Errors from the question-answering facade.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Retrieval produced no chunks for the question. Callers decide how to
    /// phrase this to the user.
    #[error("no relevant context found for the question")]
    NoContext,
    /// Retrieval failure underneath the facade.
    #[error(transparent)]
    Knowledge(#[from] KnowledgeBaseError),
    /// Generation failure, surfaced unmodified.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Renders retrieved chunks into context blocks, one per chunk, separated
/// by a blank line:
///
/// ```text
/// Document: <document_name>
/// Page: <page_number>
/// Text: "<chunk text>"
/// ```
///
/// Chunk text is included verbatim; no whitespace normalization. A chunk
/// without metadata renders as `Document: Unknown document` with
/// `Page: Unknown`.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    let blocks: Vec<String> = chunks
        .iter()
        .map(|chunk| match &chunk.metadata {
            Some(meta) => format!(
                "Document: {}\nPage: {}\nText: \"{}\"",
                meta.document_name, meta.page_number, chunk.text
            ),
            None => format!(
                "Document: Unknown document\nPage: Unknown\nText: \"{}\"",
                chunk.text
            ),
        })
        .collect();
    blocks.join("\n\n")
}

/// Question answering over a knowledge base.
pub struct RagPipeline {
    knowledge: Arc<KnowledgeBase>,
    model: Arc<dyn GenerativeModel>,
}

impl RagPipeline {
    /// Creates a pipeline over the given knowledge base and model.
    pub fn new(knowledge: Arc<KnowledgeBase>, model: Arc<dyn GenerativeModel>) -> Self {
        Self { knowledge, model }
    }

    /// The knowledge base this pipeline answers from.
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Answers a question from retrieved context.
    ///
    /// Fails with [`PipelineError::NoContext`] when retrieval comes back
    /// empty; the caller renders the user-facing message.
    #[instrument(skip_all)]
    pub async fn ask(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, PipelineError> {
        let prompt = self.prepare_prompt(question, history).await?;
        Ok(self.model.generate(&prompt).await?)
    }

    /// Streaming variant of [`ask`](Self::ask). Fragments preserve the
    /// model's whitespace exactly; callers concatenate without joining
    /// logic of their own.
    #[instrument(skip_all)]
    pub async fn ask_stream(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<TokenStream, PipelineError> {
        let prompt = self.prepare_prompt(question, history).await?;
        Ok(self.model.generate_stream(&prompt).await?)
    }

    async fn prepare_prompt(
        &self,
        question: &str,
        history: &[ChatTurn],
    ) -> Result<String, PipelineError> {
        let chunks = self.knowledge.retrieve(question).await?;
        if chunks.is_empty() {
            return Err(PipelineError::NoContext);
        }
        debug!(chunks = chunks.len(), "context assembled");
        let context = build_context(&chunks);
        Ok(build_prompt(question, &context, history))
    }
}

/// Builds the grounded prompt: context blocks, trailing history window,
/// the question, and citation instructions.
fn build_prompt(question: &str, context: &str, history: &[ChatTurn]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a precise assistant that answers questions using the provided \
         document context and conversation history when relevant.\n\n",
    );
    prompt.push_str("Context from documents:\n");
    prompt.push_str(context);
    prompt.push('\n');

    if !history.is_empty() {
        prompt.push_str("\nPrevious conversation:\n");
        let start = history.len().saturating_sub(HISTORY_WINDOW);
        for turn in &history[start..] {
            let role = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            let _ = writeln!(prompt, "{role}: {}", turn.content);
        }
    }

    let _ = write!(
        prompt,
        "\nCurrent question: {question}\n\n\
         Answer strictly from the context above. Quote the relevant passage \
         before explaining it and cite it as Source: <document_name>, Page \
         <page_number>. If the context does not contain the answer, say so \
         explicitly."
    );
    prompt
}
