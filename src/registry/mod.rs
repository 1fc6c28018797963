//! Document registry.
//!
//! Tracks every ingested document: its generated id, source, display name,
//! and ingestion time. The registry is the catalog the lifecycle manager
//! consults for listing, lookup, and deletion; the chunk data itself lives
//! in the vector store, and registry removal is best-effort relative to
//! index removal.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Catalog entry for one ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Generated document id (UUID v4)
    pub doc_id: String,
    /// Origin of the content: file path, URL, or a caller-chosen label
    pub source: String,
    /// Human-readable name used for citations and lookup
    pub display_name: String,
    /// Unix timestamp of the last (re-)registration, in seconds
    pub created_at: u64,
}

/// Errors from registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Underlying registry storage failed.
    #[error("registry storage error: {0}")]
    Storage(String),
}

/// Document catalog.
///
/// `register` is an upsert keyed by display name: registering a name that
/// already exists keeps its doc_id, so chunk ids stay stable when a document
/// is refreshed.
#[async_trait::async_trait]
pub trait DocumentRegistry: Send + Sync {
    /// Registers or refreshes a document, returning its record.
    ///
    /// A new display name gets a fresh UUID v4 id; a name already registered
    /// keeps its existing id and has its source and timestamp updated.
    async fn register(
        &self,
        source: &str,
        display_name: &str,
    ) -> Result<DocumentRecord, RegistryError>;

    /// Fetches a document record by id.
    async fn get(&self, doc_id: &str) -> Result<Option<DocumentRecord>, RegistryError>;

    /// Looks a document up by display name.
    async fn find_by_name(
        &self,
        display_name: &str,
    ) -> Result<Option<DocumentRecord>, RegistryError>;

    /// Lists every registered document, sorted by display name.
    async fn list(&self) -> Result<Vec<DocumentRecord>, RegistryError>;

    /// Removes a document by id. Returns false when the id was not
    /// registered; removal of an unknown id is not an error.
    async fn remove(&self, doc_id: &str) -> Result<bool, RegistryError>;
}

/// Derives a display name from a file path or URL.
///
/// Takes the final path segment and strips any query string, falling back
/// to the full source string when it has no segments.
pub fn display_name_for_source(source: &str) -> String {
    let trimmed = source.trim_end_matches('/');
    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let segment = segment.split('?').next().unwrap_or(segment);
    if segment.is_empty() {
        trimmed.to_string()
    } else {
        segment.to_string()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// In-memory registry keyed by doc_id.
#[derive(Default)]
pub struct InMemoryRegistry {
    records: RwLock<HashMap<String, DocumentRecord>>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, DocumentRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl DocumentRegistry for InMemoryRegistry {
    async fn register(
        &self,
        source: &str,
        display_name: &str,
    ) -> Result<DocumentRecord, RegistryError> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let doc_id = records
            .values()
            .find(|record| record.display_name == display_name)
            .map(|existing| existing.doc_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let record = DocumentRecord {
            doc_id: doc_id.clone(),
            source: source.to_string(),
            display_name: display_name.to_string(),
            created_at: unix_now(),
        };
        records.insert(doc_id, record.clone());
        Ok(record)
    }

    async fn get(&self, doc_id: &str) -> Result<Option<DocumentRecord>, RegistryError> {
        Ok(self.read().get(doc_id).cloned())
    }

    async fn find_by_name(
        &self,
        display_name: &str,
    ) -> Result<Option<DocumentRecord>, RegistryError> {
        Ok(self
            .read()
            .values()
            .find(|record| record.display_name == display_name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>, RegistryError> {
        let mut all: Vec<DocumentRecord> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(all)
    }

    async fn remove(&self, doc_id: &str) -> Result<bool, RegistryError> {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(doc_id).is_some())
    }
}
