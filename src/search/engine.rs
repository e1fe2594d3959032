//! Query engine - embeds a query and ranks stored records against it
//!
//! One query makes exactly one embedding call and one similarity scan. The
//! engine refuses to compare vectors from different providers or dimensions.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::embedding::{cosine_similarity, EmbeddingProvider};
use super::store::VectorStore;
use super::types::{MatchKind, SearchFilter, SearchResult};
use crate::core::document::Document;
use crate::error::{Result, SearchError};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// How results are gathered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Cosine similarity only.
    #[default]
    Vector,
    /// Vector results, then keyword matches to fill up to the limit.
    Hybrid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub filter: SearchFilter,
    pub mode: SearchMode,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            filter: SearchFilter::default(),
            mode: SearchMode::Vector,
        }
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }
}

pub struct QueryEngine {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    timeout: Duration,
    min_similarity: Option<f32>,
}

impl QueryEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            provider,
            store,
            timeout: DEFAULT_QUERY_TIMEOUT,
            min_similarity: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drop vector results scoring below `min`.
    pub fn with_min_similarity(mut self, min: Option<f32>) -> Self {
        self.min_similarity = min;
        self
    }

    /// Search for documents similar to `query`
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        let request = SearchRequest::new(query, limit).with_filter(filter.cloned().unwrap_or_default());
        self.search_with(&request, &CancellationToken::new()).await
    }

    pub async fn search_with(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let query = request.query.trim();
        if query.is_empty() || request.limit == 0 {
            return Ok(Vec::new());
        }

        let Some(dimension) = self.store.dimension()? else {
            debug!("index has no schema yet, nothing to search");
            return Ok(Vec::new());
        };
        let tag = self.provider.provider_tag();
        if let Some(index_tag) = self.store.provider_tag()? {
            if index_tag != tag {
                error!(index = %index_tag, active = %tag, "provider mismatch");
                return Err(SearchError::ProviderMismatch {
                    index: index_tag,
                    active: tag.to_string(),
                });
            }
        }
        if dimension != self.provider.dimension() {
            return Err(SearchError::DimensionMismatch {
                expected: dimension,
                actual: self.provider.dimension(),
            });
        }

        let vector = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Cancelled),
            _ = tokio::time::sleep(self.timeout) => return Err(SearchError::Timeout(self.timeout)),
            r = self.provider.embed(query) => r?,
        };

        let filter = (!request.filter.is_empty()).then_some(&request.filter);
        let mut results = self.store.query_similar(&vector, request.limit, filter)?;
        if let Some(min) = self.min_similarity {
            results.retain(|r| r.similarity >= min);
        }

        if request.mode == SearchMode::Hybrid && results.len() < request.limit {
            self.fill_with_keyword_matches(query, &vector, request, &mut results)?;
        }

        info!(
            provider = %tag,
            mode = ?request.mode,
            result_count = results.len(),
            "query complete"
        );
        Ok(results)
    }

    /// Append keyword matches not already present, best score first, each
    /// reporting its real cosine similarity.
    fn fill_with_keyword_matches(
        &self,
        query: &str,
        vector: &[f32],
        request: &SearchRequest,
        results: &mut Vec<SearchResult>,
    ) -> Result<()> {
        let terms = query_terms(query);
        let mut matches: Vec<(f32, Document)> = self
            .store
            .list_all()?
            .into_iter()
            .filter(|doc| request.filter.matches(doc))
            .filter(|doc| !results.iter().any(|r| r.document.id == doc.id))
            .filter_map(|doc| {
                let score = keyword_score(&terms, &doc);
                (score > 0.0).then_some((score, doc))
            })
            .collect();
        matches.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));

        for (_, doc) in matches {
            if results.len() >= request.limit {
                break;
            }
            let similarity = self
                .store
                .get_record(&doc.id)?
                .map(|r| cosine_similarity(vector, &r.embedding))
                .unwrap_or(0.0);
            results.push(SearchResult {
                document: doc,
                similarity,
                match_kind: MatchKind::Keyword,
            });
        }
        Ok(())
    }
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query.to_lowercase().split_whitespace() {
        if !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    }
    terms
}

/// Fraction of query terms found in the title or body, case-insensitively.
fn keyword_score(terms: &[String], doc: &Document) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let title = doc.title.to_lowercase();
    let body = doc.body.to_lowercase();
    let matched = terms
        .iter()
        .filter(|t| title.contains(t.as_str()) || body.contains(t.as_str()))
        .count();
    matched as f32 / terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedding::LocalProvider;
    use crate::search::store::MemoryStore;
    use crate::search::types::IndexedRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same vector for every input.
    struct Fixed {
        vector: Vec<f32>,
        tag: String,
        fail: Option<fn() -> SearchError>,
        hang: bool,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(vector: Vec<f32>) -> Self {
            let tag = format!("fixed:v1:{}", vector.len());
            Self {
                vector,
                tag,
                fail: None,
                hang: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Fixed {
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if let Some(fail) = self.fail {
                return Err(fail());
            }
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }

        fn dimension(&self) -> usize {
            self.vector.len()
        }

        fn provider_tag(&self) -> &str {
            &self.tag
        }
    }

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_schema(2).unwrap();
        let records = [
            (Document::new("a", "Alpha", "first entry").with_folder("x"), vec![1.0, 0.0]),
            (Document::new("b", "Beta", "contains the needle"), vec![0.0, 1.0]),
            (Document::new("c", "Gamma", "third entry").with_folder("x"), vec![0.6, 0.8]),
            (Document::new("d", "Delta", "needle and thread"), vec![-1.0, 0.0]),
        ];
        for (doc, embedding) in records {
            store
                .upsert(&IndexedRecord::new(doc, embedding, "fixed:v1:2"))
                .unwrap();
        }
        store
    }

    fn engine(provider: Fixed, store: Arc<MemoryStore>) -> QueryEngine {
        QueryEngine::new(Arc::new(provider), store)
    }

    #[tokio::test]
    async fn test_ranks_by_similarity() {
        let qe = engine(Fixed::new(vec![1.0, 0.0]), seeded_store());
        let results = qe.search("anything", 3, None).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!((results[1].similarity - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_query_and_zero_limit_skip_provider() {
        let provider = Arc::new(Fixed::new(vec![1.0, 0.0]));
        let qe = QueryEngine::new(provider.clone(), seeded_store());
        assert!(qe.search("   ", 5, None).await.unwrap().is_empty());
        assert!(qe.search("alpha", 0, None).await.unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let qe = engine(Fixed::new(vec![1.0, 0.0]), Arc::new(MemoryStore::new()));
        assert!(qe.search("alpha", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_and_min_similarity() {
        let store = seeded_store();
        let qe = engine(Fixed::new(vec![1.0, 0.0]), store.clone());
        let filter = SearchFilter::folder("x");
        let ids: Vec<_> = qe
            .search("q", 10, Some(&filter))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.document.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        let qe = engine(Fixed::new(vec![1.0, 0.0]), store).with_min_similarity(Some(0.5));
        assert_eq!(qe.search("q", 10, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hybrid_appends_keyword_matches() {
        let qe = engine(Fixed::new(vec![1.0, 0.0]), seeded_store()).with_min_similarity(Some(0.5));

        let vector_only = qe.search("needle", 4, None).await.unwrap();
        assert_eq!(vector_only.len(), 2);

        let request = SearchRequest::new("needle", 3).with_mode(SearchMode::Hybrid);
        let results = qe
            .search_with(&request, &CancellationToken::new())
            .await
            .unwrap();
        let summary: Vec<_> = results
            .iter()
            .map(|r| (r.id(), r.match_kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a", MatchKind::Vector),
                ("c", MatchKind::Vector),
                ("b", MatchKind::Keyword),
            ]
        );
        assert_eq!(results[2].similarity, 0.0);
    }

    #[tokio::test]
    async fn test_provider_mismatch() {
        let mut other = Fixed::new(vec![1.0, 0.0]);
        other.tag = "other:v2:2".to_string();
        let err = engine(other, seeded_store()).search("q", 5, None).await.unwrap_err();
        assert!(matches!(err, SearchError::ProviderMismatch { .. }));
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = Arc::new(MemoryStore::new());
        store.create_schema(768).unwrap();
        let qe = QueryEngine::new(Arc::new(LocalProvider::new(384).unwrap()), store);
        let err = qe.search("docker", 5, None).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::DimensionMismatch { expected: 768, actual: 384 }
        ));
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_an_error() {
        let mut provider = Fixed::new(vec![1.0, 0.0]);
        provider.fail = Some(|| SearchError::unavailable("fixed", "connection refused"));
        let err = engine(provider, seeded_store()).search("q", 5, None).await.unwrap_err();
        assert!(matches!(err, SearchError::ProviderUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_and_cancellation() {
        let mut provider = Fixed::new(vec![1.0, 0.0]);
        provider.hang = true;
        let qe = engine(provider, seeded_store()).with_timeout(Duration::from_secs(2));

        let err = qe.search("q", 5, None).await.unwrap_err();
        assert!(matches!(err, SearchError::Timeout(d) if d == Duration::from_secs(2)));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = qe
            .search_with(&SearchRequest::new("q", 5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Cancelled));
    }

    #[test]
    fn test_keyword_score() {
        let terms = query_terms("Needle THREAD needle");
        assert_eq!(terms, vec!["needle", "thread"]);
        let doc = Document::new("d", "Delta", "needle only");
        assert_eq!(keyword_score(&terms, &doc), 0.5);
    }
}
