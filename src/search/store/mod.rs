//! Vector stores
//!
//! A persistent table of `(id, title, body, folder, tags, provider_tag,
//! content_hash, embedding)` plus index-level metadata (dimension, provider
//! tag, last full index). The indexing pipeline and query engine only see the
//! [`VectorStore`] trait, so the backing engine can be swapped freely.

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use crate::core::document::Document;
use crate::error::{Result, SearchError};
use crate::search::types::{IndexStats, IndexedRecord, SearchFilter, SearchResult};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage backend for indexed records with cosine-similarity search.
///
/// Implementations must make each `upsert` atomic: readers observe either the
/// previous record or the new one, never a mix. Writes to different ids may
/// proceed concurrently; reads must not wait on a whole indexing run.
pub trait VectorStore: Send + Sync {
    /// Fix the index dimension. Idempotent for the same dimension.
    fn create_schema(&self, dimension: usize) -> Result<()>;

    /// Dimension fixed by `create_schema`, if any.
    fn dimension(&self) -> Result<Option<usize>>;

    /// Tag of the provider that produced the stored vectors, if any.
    fn provider_tag(&self) -> Result<Option<String>>;

    /// Insert or overwrite by id.
    fn upsert(&self, record: &IndexedRecord) -> Result<()>;

    /// Remove a record. Returns whether anything was removed.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Up to `limit` records matching `filter`, by descending similarity then id.
    fn query_similar(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>>;

    /// All documents, ordered by id.
    fn list_all(&self) -> Result<Vec<Document>>;

    fn get_by_id(&self, id: &str) -> Result<Option<Document>>;

    /// Full record including the embedding.
    fn get_record(&self, id: &str) -> Result<Option<IndexedRecord>>;

    /// Distinct non-empty folders, sorted.
    fn list_folders(&self) -> Result<Vec<String>>;

    /// Stored id → content hash, used to skip unchanged documents.
    fn fingerprints(&self) -> Result<HashMap<String, String>>;

    /// Record the completion time of a full indexing run.
    fn mark_indexed(&self, timestamp: i64) -> Result<()>;

    fn stats(&self) -> Result<IndexStats>;

    /// Drop every record and all index metadata.
    fn clear(&self) -> Result<()>;

    /// Flush and release resources.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Like `get_by_id`, but absence is an error.
    fn require_by_id(&self, id: &str) -> Result<Document> {
        self.get_by_id(id)?
            .ok_or_else(|| SearchError::RecordNotFound(id.to_string()))
    }
}

/// Checks shared by every backend before a record is written.
pub(crate) fn check_upsert(
    dimension: Option<usize>,
    index_tag: Option<&str>,
    record: &IndexedRecord,
) -> Result<()> {
    let expected = dimension.ok_or_else(|| {
        SearchError::Config("vector store schema not created; call create_schema first".to_string())
    })?;
    if record.embedding.len() != expected {
        return Err(SearchError::DimensionMismatch {
            expected,
            actual: record.embedding.len(),
        });
    }
    if let Some(tag) = index_tag {
        if tag != record.provider_tag {
            return Err(SearchError::ProviderMismatch {
                index: tag.to_string(),
                active: record.provider_tag.clone(),
            });
        }
    }
    record.document.validate()
}

pub(crate) fn check_query(dimension: Option<usize>, vector: &[f32]) -> Result<()> {
    match dimension {
        Some(expected) if expected != vector.len() => Err(SearchError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}
