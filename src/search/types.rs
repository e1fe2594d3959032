//! Records, filters and results shared by stores and engines.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::document::Document;

/// Decimal places kept when similarities are serialized.
pub const SIMILARITY_PRECISION: i32 = 4;

/// A document as persisted in a vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub document: Document,
    pub embedding: Vec<f32>,
    pub provider_tag: String,
    pub content_hash: String,
}

impl IndexedRecord {
    pub fn new(document: Document, embedding: Vec<f32>, provider_tag: impl Into<String>) -> Self {
        let content_hash = document.content_hash();
        Self {
            document,
            embedding,
            provider_tag: provider_tag.into(),
            content_hash,
        }
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }
}

/// Restricts a similarity search to part of the index.
///
/// A record matches when its folder equals `folder` (if set) and it carries
/// every tag in `tags`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl SearchFilter {
    pub fn folder(folder: impl Into<String>) -> Self {
        Self {
            folder: Some(folder.into()),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.folder.is_none() && self.tags.is_empty()
    }

    pub fn matches(&self, document: &Document) -> bool {
        let folder_ok = match &self.folder {
            Some(f) => document.folder.as_deref() == Some(f.as_str()),
            None => true,
        };
        folder_ok && document.has_tags(&self.tags)
    }
}

/// How a result entered the result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Vector,
    Keyword,
}

/// A document with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub document: Document,
    pub similarity: f32,
    pub match_kind: MatchKind,
}

impl SearchResult {
    pub fn vector(document: Document, similarity: f32) -> Self {
        Self {
            document,
            similarity,
            match_kind: MatchKind::Vector,
        }
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    /// Serializable row for external callers.
    pub fn to_json_row(&self) -> SearchResultRow {
        SearchResultRow {
            id: self.document.id.clone(),
            title: self.document.title.clone(),
            folder: self.document.folder.clone(),
            tags: self.document.tags.clone(),
            similarity: round_similarity(self.similarity),
            match_kind: self.match_kind,
        }
    }
}

/// `{id, title, folder, tags, similarity}` as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultRow {
    pub id: String,
    pub title: String,
    pub folder: Option<String>,
    pub tags: Vec<String>,
    pub similarity: f64,
    pub match_kind: MatchKind,
}

pub fn round_similarity(similarity: f32) -> f64 {
    let factor = 10f64.powi(SIMILARITY_PRECISION);
    (similarity as f64 * factor).round() / factor
}

/// Descending similarity, then ascending id.
pub fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.document.id.cmp(&b.document.id))
}

/// Sort into ranking order and keep the first `limit`.
pub fn rank(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(compare_results);
    results.truncate(limit);
    results
}

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub record_count: usize,
    pub dimension: Option<usize>,
    pub provider_tag: Option<String>,
    pub folder_count: usize,
    pub last_indexed: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, similarity: f32) -> SearchResult {
        SearchResult::vector(Document::new(id, id, "body"), similarity)
    }

    #[test]
    fn test_rank_breaks_ties_by_id() {
        let ranked = rank(
            vec![result("c", 0.5), result("a", 0.5), result("b", 0.9), result("d", -0.2)],
            3,
        );
        let ids: Vec<_> = ranked.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_round_similarity() {
        assert_eq!(round_similarity(0.123456), 0.1235);
        assert_eq!(round_similarity(-1.0), -1.0);
        assert_eq!(round_similarity(0.0), 0.0);
    }

    #[test]
    fn test_filter_matches() {
        let doc = Document::new("a", "A", "x").with_folder("guides").with_tags(["rust", "db"]);
        assert!(SearchFilter::default().matches(&doc));
        assert!(SearchFilter::folder("guides").matches(&doc));
        assert!(!SearchFilter::folder("blog").matches(&doc));
        assert!(SearchFilter::folder("guides").with_tag("db").matches(&doc));
        assert!(!SearchFilter::default().with_tag("web").matches(&doc));
    }

    #[test]
    fn test_row_serialization() {
        let row = result("a", 0.987654).to_json_row();
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["id"], "a");
        assert_eq!(json["similarity"], 0.9877);
        assert_eq!(json["match_kind"], "vector");
    }
}
