//! In-process vector store, used for `:memory:` and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::RwLock;

use super::{check_query, check_upsert, VectorStore};
use crate::core::document::Document;
use crate::error::{Result, SearchError};
use crate::search::embedding::cosine_similarity;
use crate::search::types::{rank, IndexStats, IndexedRecord, SearchFilter, SearchResult};

#[derive(Default)]
struct State {
    dimension: Option<usize>,
    provider_tag: Option<String>,
    last_indexed: Option<i64>,
    records: BTreeMap<String, IndexedRecord>,
}

/// Records held in a `BTreeMap` behind a read/write lock.
///
/// Upserts replace the whole record under the write lock, so readers never
/// see a partially written entry.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for MemoryStore {
    fn create_schema(&self, dimension: usize) -> Result<()> {
        let mut state = self.state.write();
        match state.dimension {
            Some(existing) if existing != dimension => Err(SearchError::DimensionConflict {
                existing,
                requested: dimension,
            }),
            _ => {
                state.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.state.read().dimension)
    }

    fn provider_tag(&self) -> Result<Option<String>> {
        Ok(self.state.read().provider_tag.clone())
    }

    fn upsert(&self, record: &IndexedRecord) -> Result<()> {
        let mut state = self.state.write();
        check_upsert(state.dimension, state.provider_tag.as_deref(), record)?;
        if state.provider_tag.is_none() {
            state.provider_tag = Some(record.provider_tag.clone());
        }
        state.records.insert(record.id().to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.state.write().records.remove(id).is_some())
    }

    fn query_similar(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        let state = self.state.read();
        check_query(state.dimension, vector)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let results = state
            .records
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.document)))
            .map(|r| SearchResult::vector(r.document.clone(), cosine_similarity(vector, &r.embedding)))
            .collect();
        Ok(rank(results, limit))
    }

    fn list_all(&self) -> Result<Vec<Document>> {
        Ok(self
            .state
            .read()
            .records
            .values()
            .map(|r| r.document.clone())
            .collect())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.state.read().records.get(id).map(|r| r.document.clone()))
    }

    fn get_record(&self, id: &str) -> Result<Option<IndexedRecord>> {
        Ok(self.state.read().records.get(id).cloned())
    }

    fn list_folders(&self) -> Result<Vec<String>> {
        let state = self.state.read();
        let folders: BTreeSet<&String> = state
            .records
            .values()
            .filter_map(|r| r.document.folder.as_ref())
            .filter(|f| !f.is_empty())
            .collect();
        Ok(folders.into_iter().cloned().collect())
    }

    fn fingerprints(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .state
            .read()
            .records
            .iter()
            .map(|(id, r)| (id.clone(), r.content_hash.clone()))
            .collect())
    }

    fn mark_indexed(&self, timestamp: i64) -> Result<()> {
        self.state.write().last_indexed = Some(timestamp);
        Ok(())
    }

    fn stats(&self) -> Result<IndexStats> {
        let folder_count = self.list_folders()?.len();
        let state = self.state.read();
        Ok(IndexStats {
            record_count: state.records.len(),
            dimension: state.dimension,
            provider_tag: state.provider_tag.clone(),
            folder_count,
            last_indexed: state.last_indexed,
        })
    }

    fn clear(&self) -> Result<()> {
        *self.state.write() = State::default();
        Ok(())
    }
}
