//! Document lifecycle manager.
//!
//! [`KnowledgeBase`] owns the consistency of the three places a document
//! lives: the registry (catalog), the vector store (authoritative chunks),
//! and the lexical snapshot (derived). Ingest and delete serialize on an
//! async mutex; reads never block on mutations because the lexical snapshot
//! is published behind a single reference swap.

use crate::chunking::Chunker;
use crate::config::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_FETCH_K, DEFAULT_RETRIEVE_K,
    DEFAULT_TOP_K, NEIGHBOR_RADIUS,
};
use crate::embedding::Embedder;
use crate::error::{ChunkingError, UpstreamError};
use crate::registry::{DocumentRecord, DocumentRegistry, RegistryError};
use crate::search::{
    expand_with_neighbors, HybridRetriever, LexicalIndex, RetrievedChunk, ScoredChunk,
    SearchError,
};
use crate::store::{
    composite_id, doc_id_prefix, ChunkMetadata, StoredChunk, VectorStore, VectorStoreError,
};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Loader output: either a flat text or per-page texts.
///
/// Loaders themselves (PDF, HTML, plain text) live outside this crate;
/// they hand over content in one of these two shapes.
#[derive(Debug, Clone)]
pub enum DocumentContent {
    /// Whole-document text, treated as page 1
    Plain(String),
    /// `(page_number, text)` pairs; page numbers are 1-based
    Paged(Vec<(u32, String)>),
}

/// Errors from document lifecycle operations.
#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    /// Input failed validation before anything was committed.
    #[error("validation error: {0}")]
    Validation(String),
    /// Chunker configuration was invalid.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Vector store failure after recovery was exhausted.
    #[error(transparent)]
    Store(#[from] VectorStoreError),
    /// Upstream service failure, surfaced unmodified.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Registry failure during a required (non-best-effort) operation.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Retrieval failure.
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Manages document ingest, deletion, and retrieval over one chunk corpus.
pub struct KnowledgeBase {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    registry: Arc<dyn DocumentRegistry>,
    chunker: Chunker,
    retriever: HybridRetriever,
    /// Current lexical snapshot; replaced wholesale after every mutation.
    lexical: RwLock<Arc<LexicalIndex>>,
    /// Serializes ingest and delete. Held across await points, so this is
    /// the async mutex, not the std one.
    mutation: futures::lock::Mutex<()>,
}

impl KnowledgeBase {
    /// Creates a knowledge base with the default chunking configuration.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        registry: Arc<dyn DocumentRegistry>,
    ) -> Result<Self, ChunkingError> {
        let chunker = Chunker::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)?;
        Ok(Self::with_chunker(store, embedder, registry, chunker))
    }

    /// Creates a knowledge base with an explicit chunker.
    pub fn with_chunker(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        registry: Arc<dyn DocumentRegistry>,
        chunker: Chunker,
    ) -> Self {
        let retriever = HybridRetriever::new(store.clone(), embedder.clone());
        Self {
            store,
            embedder,
            registry,
            chunker,
            retriever,
            lexical: RwLock::new(Arc::new(LexicalIndex::empty())),
            mutation: futures::lock::Mutex::new(()),
        }
    }

    /// Rebuilds the lexical snapshot from the store.
    ///
    /// Call after constructing over a store that already holds chunks.
    pub async fn refresh(&self) -> Result<(), KnowledgeBaseError> {
        let _guard = self.mutation.lock().await;
        self.rebuild_lexical().await?;
        Ok(())
    }

    /// Ingests a document, replacing any prior version under the same name.
    ///
    /// All-or-nothing: the content is chunked and fully embedded before the
    /// first write; an embedding failure commits nothing. Chunk indices run
    /// continuously across pages. A [`VectorStoreError::Transient`] during
    /// the commit resets the store and retries the commit once.
    #[instrument(skip_all, fields(display_name))]
    pub async fn add_document(
        &self,
        source: &str,
        display_name: &str,
        content: DocumentContent,
    ) -> Result<DocumentRecord, KnowledgeBaseError> {
        if display_name.trim().is_empty() {
            return Err(KnowledgeBaseError::Validation(
                "document display name must not be empty".to_string(),
            ));
        }

        let _guard = self.mutation.lock().await;

        let record = self.registry.register(source, display_name).await?;
        let url = source
            .starts_with("http")
            .then(|| source.to_string());

        // Chunk per page; indices continue across page boundaries.
        let pages: Vec<(u32, String)> = match content {
            DocumentContent::Plain(text) => vec![(1, text)],
            DocumentContent::Paged(pages) => pages,
        };
        let mut texts: Vec<String> = Vec::new();
        let mut metadatas: Vec<ChunkMetadata> = Vec::new();
        for (page_number, page_text) in &pages {
            for chunk_text in self.chunker.chunk(page_text) {
                metadatas.push(ChunkMetadata {
                    doc_id: record.doc_id.clone(),
                    chunk_index: texts.len(),
                    document_name: record.display_name.clone(),
                    page_number: *page_number,
                    url: url.clone(),
                });
                texts.push(chunk_text);
            }
        }

        // Embed everything before touching the store: an upstream failure
        // here leaves the prior version of the document intact.
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(KnowledgeBaseError::Validation(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }

        let chunks: Vec<StoredChunk> = texts
            .into_iter()
            .zip(embeddings)
            .zip(metadatas)
            .map(|((text, embedding), metadata)| StoredChunk {
                id: composite_id(&metadata.doc_id, metadata.chunk_index),
                text,
                metadata,
                embedding,
            })
            .collect();

        self.commit_with_recovery(&record.doc_id, chunks).await?;
        self.rebuild_lexical().await?;

        info!(doc_id = %record.doc_id, "document ingested");
        Ok(record)
    }

    /// Removes a document and all its chunks.
    ///
    /// Returns `Ok(false)` when the doc_id owns no chunks and no registry
    /// record; deleting an unknown document is not an error. Registry
    /// removal is best-effort: a registry failure after the index is
    /// already clean logs a warning instead of failing the call.
    #[instrument(skip_all, fields(doc_id))]
    pub async fn delete_document(&self, doc_id: &str) -> Result<bool, KnowledgeBaseError> {
        let _guard = self.mutation.lock().await;

        let prefix = doc_id_prefix(doc_id);
        let removed = match self.remove_prefix(&prefix).await {
            Ok(removed) => removed,
            Err(VectorStoreError::Transient(reason)) => {
                warn!(reason, "transient store failure during delete, resetting index");
                self.store.reset().await?;
                self.remove_prefix(&prefix).await?
            }
            Err(e) => return Err(e.into()),
        };

        let had_chunks = removed > 0;
        if had_chunks {
            self.rebuild_lexical().await?;
        }

        let had_record = match self.registry.remove(doc_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "registry removal failed after index cleanup");
                false
            }
        };

        debug!(chunks_removed = removed, had_record, "document deleted");
        Ok(had_chunks || had_record)
    }

    /// Scans for ids under `prefix` and deletes them, returning how many
    /// chunks were removed.
    async fn remove_prefix(&self, prefix: &str) -> Result<usize, VectorStoreError> {
        let ids: Vec<String> = self
            .store
            .all()
            .await?
            .into_iter()
            .map(|chunk| chunk.id)
            .filter(|id| id.starts_with(prefix))
            .collect();
        if !ids.is_empty() {
            self.store.delete(&ids).await?;
        }
        Ok(ids.len())
    }

    /// Hybrid search without neighbor expansion.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        fetch_k: usize,
    ) -> Result<Vec<ScoredChunk>, KnowledgeBaseError> {
        let lexical = self.lexical_snapshot();
        Ok(self.retriever.search(&lexical, query, k, fetch_k).await?)
    }

    /// Retrieval for context assembly: hybrid search with defaults, then
    /// neighbor expansion, capped at the retrieval budget.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, KnowledgeBaseError> {
        self.retrieve_with(query, DEFAULT_TOP_K, DEFAULT_FETCH_K, DEFAULT_RETRIEVE_K)
            .await
    }

    /// Retrieval with explicit depths: `k` fused hits from `fetch_k`
    /// candidates per branch, expanded and truncated to `budget` chunks.
    #[instrument(skip_all, fields(k, fetch_k, budget))]
    pub async fn retrieve_with(
        &self,
        query: &str,
        k: usize,
        fetch_k: usize,
        budget: usize,
    ) -> Result<Vec<RetrievedChunk>, KnowledgeBaseError> {
        let hits = self.search(query, k, fetch_k).await?;
        let mut expanded =
            expand_with_neighbors(self.store.as_ref(), &hits, NEIGHBOR_RADIUS).await?;
        expanded.truncate(budget);
        Ok(expanded)
    }

    /// Lists every registered document.
    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>, KnowledgeBaseError> {
        Ok(self.registry.list().await?)
    }

    /// Number of chunks currently stored.
    pub async fn chunk_count(&self) -> Result<usize, KnowledgeBaseError> {
        Ok(self.store.count().await?)
    }

    /// Current lexical snapshot (cheap Arc clone).
    fn lexical_snapshot(&self) -> Arc<LexicalIndex> {
        self.lexical
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Prefix-delete plus upsert, with one-shot recovery from a transient
    /// store failure: reset the index and run the commit again. A second
    /// transient failure escalates.
    async fn commit_with_recovery(
        &self,
        doc_id: &str,
        chunks: Vec<StoredChunk>,
    ) -> Result<(), KnowledgeBaseError> {
        match self.commit(doc_id, chunks.clone()).await {
            Ok(()) => Ok(()),
            Err(VectorStoreError::Transient(reason)) => {
                warn!(reason, "transient store failure, resetting index");
                self.store.reset().await?;
                self.commit(doc_id, chunks).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(&self, doc_id: &str, chunks: Vec<StoredChunk>) -> Result<(), VectorStoreError> {
        let prefix = doc_id_prefix(doc_id);
        let stale: Vec<String> = self
            .store
            .all()
            .await?
            .into_iter()
            .map(|chunk| chunk.id)
            .filter(|id| id.starts_with(&prefix))
            .collect();
        if !stale.is_empty() {
            self.store.delete(&stale).await?;
        }
        self.store.upsert(chunks).await
    }

    /// Rebuilds the BM25 snapshot from the store and publishes it. The
    /// write lock is held only for the pointer swap. A transient store
    /// failure during the corpus scan resets the index and rescans once.
    async fn rebuild_lexical(&self) -> Result<(), VectorStoreError> {
        let corpus = match self.store.all().await {
            Ok(corpus) => corpus,
            Err(VectorStoreError::Transient(reason)) => {
                warn!(reason, "transient store failure during rebuild, resetting index");
                self.store.reset().await?;
                self.store.all().await?
            }
            Err(e) => return Err(e),
        };
        let snapshot = Arc::new(LexicalIndex::build(corpus));
        *self
            .lexical
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
        Ok(())
    }
}
