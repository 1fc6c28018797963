//! BM25 lexical index over the chunk corpus.
//!
//! Wraps the [`bm25`](https://crates.io/crates/bm25) crate. The index is an
//! immutable snapshot: it is built in one shot from every chunk in the
//! authoritative store and replaced wholesale after each mutation, never
//! updated incrementally. Corpus-dependent statistics (IDF, average length)
//! are therefore always consistent with the chunks being searched.

use super::types::{ChunkKey, ScoredChunk};
use crate::store::ChunkPayload;
use bm25::{Document, Language, SearchEngineBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Word-token scanner used for the lexical query gate.
static WORD: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\w+").expect("word token regex is valid")
});

/// Lowercase word tokens of a text, in order.
///
/// This is the gate for lexical probes: a query that produces no tokens
/// (punctuation only, whitespace only) cannot match anything and is skipped
/// before it reaches the BM25 engine.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Immutable BM25 snapshot over all stored chunks.
///
/// Carries the chunk payloads alongside the engine so lexical hits resolve
/// to full text and metadata without a store round-trip. Thread-safe for
/// reads; mutation means building a new snapshot.
pub struct LexicalIndex {
    engine: bm25::SearchEngine<String>,
    payloads: HashMap<String, ChunkPayload>,
}

impl LexicalIndex {
    /// Builds a snapshot from the full chunk corpus.
    #[instrument(skip_all, fields(corpus_len = corpus.len()))]
    pub fn build(corpus: Vec<ChunkPayload>) -> Self {
        let documents: Vec<Document<String>> = corpus
            .iter()
            .map(|chunk| Document {
                id: chunk.id.clone(),
                contents: chunk.text.clone(),
            })
            .collect();
        let engine =
            SearchEngineBuilder::<String>::with_documents(Language::English, documents).build();

        let payloads = corpus
            .into_iter()
            .map(|chunk| (chunk.id.clone(), chunk))
            .collect();

        debug!("lexical snapshot built");
        Self { engine, payloads }
    }

    /// An empty snapshot, matching nothing.
    pub fn empty() -> Self {
        Self::build(Vec::new())
    }

    /// Returns up to `k` chunks with strictly positive BM25 scores,
    /// descending. Empty or token-free queries return no results.
    pub fn search(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        if k == 0 || tokenize(query).is_empty() {
            return Vec::new();
        }

        self.engine
            .search(query, k)
            .into_iter()
            .filter(|result| result.score > 0.0)
            .filter_map(|result| {
                self.payloads.get(&result.document.id).map(|payload| ScoredChunk {
                    key: ChunkKey::for_chunk(
                        &payload.id,
                        &payload.text,
                        payload.metadata.as_ref(),
                    ),
                    id: payload.id.clone(),
                    text: payload.text.clone(),
                    metadata: payload.metadata.clone(),
                    score: result.score,
                })
            })
            .collect()
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Returns true if no chunks are indexed.
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkMetadata;

    fn payload(doc_id: &str, index: usize, text: &str) -> ChunkPayload {
        ChunkPayload {
            id: format!("{doc_id}_{index}"),
            text: text.to_string(),
            metadata: Some(ChunkMetadata {
                doc_id: doc_id.to_string(),
                chunk_index: index,
                document_name: format!("{doc_id}.txt"),
                page_number: 1,
                url: None,
            }),
        }
    }

    #[test]
    fn test_tokenize_lowercases_and_strips_punctuation() {
        assert_eq!(
            tokenize("Hello, World! It's 2024."),
            vec!["hello", "world", "it", "s", "2024"]
        );
        assert!(tokenize("?!... --- ...").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_search_ranks_term_frequency() {
        let index = LexicalIndex::build(vec![
            payload("doc", 0, "rust programming"),
            payload("doc", 1, "rust rust rust is a language"),
            payload("doc", 2, "python scripting"),
        ]);

        let hits = index.search("rust", 3);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "doc_1");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_scores_descending_and_positive() {
        let index = LexicalIndex::build(vec![
            payload("doc", 0, "the quick brown fox"),
            payload("doc", 1, "the lazy dog sleeps"),
            payload("doc", 2, "quick quick brown brown"),
        ]);

        let hits = index.search("quick brown", 3);
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for hit in &hits {
            assert!(hit.score > 0.0);
        }
    }

    #[test]
    fn test_token_free_query_is_skipped() {
        let index = LexicalIndex::build(vec![payload("doc", 0, "some text")]);
        assert!(index.search("?!", 5).is_empty());
        assert!(index.search("", 5).is_empty());
    }

    #[test]
    fn test_empty_snapshot_matches_nothing() {
        let index = LexicalIndex::empty();
        assert!(index.is_empty());
        assert!(index.search("anything", 5).is_empty());
    }

    #[test]
    fn test_hits_carry_metadata() {
        let index = LexicalIndex::build(vec![payload("doc", 0, "metadata check")]);
        let hits = index.search("metadata", 1);
        assert_eq!(hits.len(), 1);
        let meta = hits[0].metadata.as_ref().unwrap();
        assert_eq!(meta.document_name, "doc.txt");
        assert_eq!(hits[0].key.identity(), Some(("doc", 0)));
    }
}
