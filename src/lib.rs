//! Hybrid retrieval and context-assembly core for document question
//! answering.
//!
//! Documents are chunked into citation-safe windows ([`chunking`]), stored
//! with typed metadata in a vector store ([`store`]), and indexed for both
//! lexical and semantic retrieval ([`search`]). Queries probe both indices
//! concurrently, fuse the rankings with Reciprocal Rank Fusion, and widen
//! the winners with their index-adjacent neighbors. [`knowledge`] keeps the
//! registry, vector store, and lexical snapshot consistent through ingest
//! and deletion; [`pipeline`] turns retrieved chunks into grounded,
//! citation-ready answers.
//!
//! External capabilities stay behind traits: [`embedding::Embedder`],
//! [`generation::GenerativeModel`], [`store::VectorStore`], and
//! [`registry::DocumentRegistry`]. In-memory implementations back the
//! tests and small corpora.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lorebook::embedding::HashEmbedder;
//! use lorebook::knowledge::{DocumentContent, KnowledgeBase};
//! use lorebook::registry::InMemoryRegistry;
//! use lorebook::store::InMemoryVectorStore;
//!
//! let kb = KnowledgeBase::new(
//!     Arc::new(InMemoryVectorStore::new()),
//!     Arc::new(HashEmbedder::default()),
//!     Arc::new(InMemoryRegistry::new()),
//! )?;
//! kb.add_document(
//!     "notes.txt",
//!     "notes.txt",
//!     DocumentContent::Plain("Ingested text.".to_string()),
//! )
//! .await?;
//! let chunks = kb.retrieve("ingested").await?;
//! ```

#![warn(missing_docs)]

pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod registry;
pub mod search;
pub mod store;

pub use chunking::Chunker;
pub use error::{ChunkingError, UpstreamError};
pub use knowledge::{DocumentContent, KnowledgeBase, KnowledgeBaseError};
pub use pipeline::{build_context, ChatRole, ChatTurn, PipelineError, RagPipeline};
pub use search::{HybridRetriever, LexicalIndex, RetrievedChunk, ScoredChunk, SearchError};
pub use store::{ChunkMetadata, StoredChunk, VectorStore, VectorStoreError};
