//! Indexing pipeline
//!
//! Turns a corpus into stored records: validate, skip unchanged documents,
//! embed in batches (a bounded number in flight), upsert, then delete records
//! whose documents have disappeared.
//!
//! Batches that exhaust their retry budget are reported and the run goes on.
//! Any other error aborts the run as `BatchFailed`, naming the batch's id
//! range and the provider. Cancellation abandons in-flight requests;
//! a batch is only written after its embeddings have fully arrived.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::embedding::EmbeddingProvider;
use super::retry::{embed_with_retry, RetryPolicy};
use super::store::VectorStore;
use super::types::IndexedRecord;
use crate::core::corpus::CorpusAdapter;
use crate::core::document::Document;
use crate::error::{Result, SearchError};

pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Re-embed documents even when their content hash is unchanged.
    pub force: bool,
    /// Delete stored records whose ids are no longer in the corpus.
    pub reconcile: bool,
    /// Deadline for the whole run.
    pub timeout: Option<Duration>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            force: false,
            reconcile: true,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    pub id: String,
    pub reason: String,
}

/// A batch whose transient failures outlasted the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBatch {
    pub ids: Vec<String>,
    pub error: String,
}

/// Outcome of an indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped: Vec<SkippedDocument>,
    pub failed_batches: Vec<FailedBatch>,
    pub duration_ms: u64,
    pub provider_tag: String,
}

impl IndexReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty()
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = &str> {
        self.failed_batches
            .iter()
            .flat_map(|b| b.ids.iter().map(String::as_str))
    }
}

enum BatchOutcome {
    Indexed(usize),
    Failed(FailedBatch),
}

pub struct IndexPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    workers: usize,
    retry: RetryPolicy,
}

impl IndexPipeline {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            provider,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Index every document the corpus currently yields.
    pub async fn run(
        &self,
        corpus: &dyn CorpusAdapter,
        options: &IndexOptions,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let documents = corpus.documents()?;
        self.index_documents(documents, options, cancel).await
    }

    pub async fn index_documents(
        &self,
        documents: Vec<Document>,
        options: &IndexOptions,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let deadline = options.timeout.map(|t| Instant::now() + t);
        let tag = self.provider.provider_tag().to_string();

        self.store.create_schema(self.provider.dimension())?;
        if let Some(index_tag) = self.store.provider_tag()? {
            if index_tag != tag {
                error!(index = %index_tag, active = %tag, "provider mismatch, refusing to index");
                return Err(SearchError::ProviderMismatch {
                    index: index_tag,
                    active: tag,
                });
            }
        }

        let mut report = IndexReport {
            provider_tag: tag.clone(),
            ..IndexReport::default()
        };

        let total = documents.len();
        let mut seen = HashSet::with_capacity(total);
        let mut accepted = Vec::with_capacity(total);
        for doc in documents {
            if let Err(e) = doc.validate() {
                warn!(id = %doc.id, error = %e, "skipping invalid document");
                report.skipped.push(SkippedDocument {
                    id: doc.id,
                    reason: e.to_string(),
                });
                continue;
            }
            if !seen.insert(doc.id.clone()) {
                warn!(id = %doc.id, "skipping duplicate document id");
                report.skipped.push(SkippedDocument {
                    id: doc.id,
                    reason: "duplicate id in corpus".to_string(),
                });
                continue;
            }
            accepted.push(doc);
        }

        let stored = self.store.fingerprints()?;
        let pending: Vec<Document> = accepted
            .into_iter()
            .filter(|doc| {
                let unchanged = !options.force
                    && stored.get(&doc.id).map(String::as_str) == Some(doc.content_hash().as_str());
                if unchanged {
                    report.unchanged += 1;
                }
                !unchanged
            })
            .collect();

        info!(
            provider = %tag,
            total,
            pending = pending.len(),
            unchanged = report.unchanged,
            skipped = report.skipped.len(),
            "starting indexing run"
        );

        let batches: Vec<&[Document]> = pending.chunks(self.batch_size).collect();
        let mut outcomes = stream::iter(batches.into_iter().enumerate())
            .map(|(i, batch)| self.process_batch(i, batch, cancel, deadline, options.timeout))
            .buffer_unordered(self.workers);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(BatchOutcome::Indexed(n)) => report.indexed += n,
                Ok(BatchOutcome::Failed(failed)) => report.failed_batches.push(failed),
                Err(e) => {
                    match &e {
                        SearchError::Cancelled | SearchError::Timeout(_) => {
                            warn!(indexed = report.indexed, error = %e, "indexing run stopped")
                        }
                        _ => error!(provider = %tag, error = %e, "indexing run aborted"),
                    }
                    return Err(e);
                }
            }
        }
        drop(outcomes);

        if options.reconcile {
            for id in stored.keys().filter(|id| !seen.contains(*id)) {
                if self.store.delete(id)? {
                    debug!(id = %id, "removed stale record");
                    report.deleted += 1;
                }
            }
        }

        if report.is_complete() {
            self.store.mark_indexed(chrono::Utc::now().timestamp())?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            provider = %tag,
            indexed = report.indexed,
            unchanged = report.unchanged,
            deleted = report.deleted,
            failed_batches = report.failed_batches.len(),
            duration_ms = report.duration_ms,
            "indexing run finished"
        );
        Ok(report)
    }

    async fn process_batch(
        &self,
        index: usize,
        batch: &[Document],
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        timeout: Option<Duration>,
    ) -> Result<BatchOutcome> {
        let texts: Vec<String> = batch.iter().map(Document::embedding_text).collect();
        let ids = || batch.iter().map(|d| d.id.clone()).collect::<Vec<_>>();

        let embedded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            _ = deadline_elapsed(deadline) => {
                return Err(SearchError::Timeout(timeout.unwrap_or_default()))
            }
            r = embed_with_retry(self.provider.as_ref(), &texts, &self.retry) => r,
        };

        let vectors = match embedded {
            Ok(v) => v,
            Err(e) if e.is_retryable() => {
                let ids = ids();
                warn!(batch = index, ids = ?ids, error = %e, "batch failed after retries");
                return Ok(BatchOutcome::Failed(FailedBatch {
                    ids,
                    error: e.to_string(),
                }));
            }
            Err(e) => return Err(self.batch_failed(index, batch, e)),
        };

        if vectors.len() != batch.len() {
            let e = SearchError::request(
                self.provider.provider_tag(),
                format!("{} embeddings for {} documents", vectors.len(), batch.len()),
            );
            return Err(self.batch_failed(index, batch, e));
        }

        let tag = self.provider.provider_tag();
        for (doc, embedding) in batch.iter().zip(vectors) {
            self.store
                .upsert(&IndexedRecord::new(doc.clone(), embedding, tag))
                .map_err(|e| self.batch_failed(index, batch, e))?;
        }

        debug!(batch = index, count = batch.len(), "indexed batch");
        Ok(BatchOutcome::Indexed(batch.len()))
    }

    fn batch_failed(&self, index: usize, batch: &[Document], source: SearchError) -> SearchError {
        let first = batch.first().map(|d| d.id.clone()).unwrap_or_default();
        let last = batch.last().map(|d| d.id.clone()).unwrap_or_default();
        let provider = self.provider.provider_tag().to_string();
        error!(
            batch = index,
            first = %first,
            last = %last,
            provider = %provider,
            error = %source,
            "batch failed, aborting run"
        );
        SearchError::BatchFailed {
            batch: index,
            first,
            last,
            provider,
            source: Box::new(source),
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
