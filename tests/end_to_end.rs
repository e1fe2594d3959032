//! Index a markdown directory into an on-disk store and query it back.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use docsearch::search::{IndexOptions, SearchContext, SearchFilter, SearchMode, SearchRequest};
use docsearch::{Document, EngineConfig, MarkdownCorpus, SearchError, StaticCorpus, StoreLocation};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "ops/docker.md",
        "---\ntitle: Docker\ntags: [containers, build]\n---\nDocker packages applications into containers.\n",
    );
    write(
        dir.path(),
        "ops/kubernetes.md",
        "---\ntags: [containers]\n---\n# Kubernetes\n\nKubernetes orchestrates containers across a cluster.\n",
    );
    write(
        dir.path(),
        "kitchen/bread.md",
        "# Bread\n\nKnead the dough, let it rise, then bake the loaf.\n",
    );
    dir
}

fn config(content: &Path, db: &Path, dimension: usize) -> EngineConfig {
    EngineConfig::builder()
        .dimension(dimension)
        .content_dir(content)
        .store(StoreLocation::File(db.to_path_buf()))
        .build()
        .unwrap()
}

async fn index(ctx: &SearchContext) -> docsearch::IndexReport {
    let corpus = MarkdownCorpus::new(&ctx.config().content_dir);
    ctx.pipeline()
        .run(&corpus, &IndexOptions::default(), &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_markdown_directory_ranking() {
    let content = fixture();
    let db = TempDir::new().unwrap();
    let ctx = SearchContext::open(config(content.path(), &db.path().join("index.db"), 384)).unwrap();

    let report = index(&ctx).await;
    assert_eq!(report.indexed, 3);
    assert!(report.is_complete());

    let results = ctx
        .query_engine()
        .search("kubernetes containers cluster", 3, None)
        .await
        .unwrap();
    let ids: Vec<_> = results.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["ops/kubernetes", "ops/docker", "kitchen/bread"]);
    assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    assert!(results.iter().all(|r| (-1.0..=1.0).contains(&r.similarity)));

    let kitchen = ctx
        .query_engine()
        .search("containers", 5, Some(&SearchFilter::folder("kitchen")))
        .await
        .unwrap();
    assert_eq!(kitchen.len(), 1);
    assert_eq!(kitchen[0].id(), "kitchen/bread");

    let tagged = ctx
        .query_engine()
        .search("containers", 5, Some(&SearchFilter::default().with_tag("build")))
        .await
        .unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].document.title, "Docker");

    ctx.close().unwrap();
}

#[tokio::test]
async fn test_reindex_is_idempotent_and_persistent() {
    let content = fixture();
    let db = TempDir::new().unwrap();
    let db_path = db.path().join("index.db");

    let ctx = SearchContext::open(config(content.path(), &db_path, 384)).unwrap();
    index(&ctx).await;
    let before: Vec<_> = ["ops/docker", "ops/kubernetes", "kitchen/bread"]
        .iter()
        .map(|id| ctx.store().get_record(id).unwrap().unwrap())
        .collect();
    ctx.close().unwrap();

    let ctx = SearchContext::open(config(content.path(), &db_path, 384)).unwrap();
    let report = index(&ctx).await;
    assert_eq!(report.indexed, 0);
    assert_eq!(report.unchanged, 3);
    for record in &before {
        let after = ctx.store().get_record(record.id()).unwrap().unwrap();
        assert_eq!(&after, record);
    }
    let stats = ctx.stats().unwrap();
    assert_eq!(stats.record_count, 3);
    assert_eq!(stats.dimension, Some(384));
    assert_eq!(stats.folder_count, 2);
    assert!(stats.last_indexed.is_some());
    ctx.close().unwrap();
}

#[tokio::test]
async fn test_deleted_file_is_removed_from_index() {
    let content = fixture();
    let db = TempDir::new().unwrap();
    let ctx = SearchContext::open(config(content.path(), &db.path().join("index.db"), 384)).unwrap();
    index(&ctx).await;

    fs::remove_file(content.path().join("kitchen/bread.md")).unwrap();
    let report = index(&ctx).await;
    assert_eq!(report.deleted, 1);
    assert!(ctx.store().get_by_id("kitchen/bread").unwrap().is_none());
    assert_eq!(ctx.store().list_folders().unwrap(), vec!["ops".to_string()]);
}

#[tokio::test]
async fn test_other_dimension_cannot_touch_index() {
    let content = fixture();
    let db = TempDir::new().unwrap();
    let db_path = db.path().join("index.db");

    let ctx = SearchContext::open(config(content.path(), &db_path, 384)).unwrap();
    index(&ctx).await;
    ctx.close().unwrap();

    let ctx = SearchContext::open(config(content.path(), &db_path, 768)).unwrap();
    let corpus = MarkdownCorpus::new(content.path());
    let err = ctx
        .pipeline()
        .run(&corpus, &IndexOptions::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SearchError::DimensionConflict { .. } | SearchError::ProviderMismatch { .. }
    ));

    let err = ctx.query_engine().search("docker", 3, None).await.unwrap_err();
    assert!(matches!(
        err,
        SearchError::ProviderMismatch { .. } | SearchError::DimensionMismatch { .. }
    ));

    // The original index is untouched.
    assert_eq!(ctx.stats().unwrap().record_count, 3);
    assert_eq!(ctx.stats().unwrap().dimension, Some(384));
}

#[tokio::test]
async fn test_rebuild_after_clear() {
    let content = fixture();
    let db = TempDir::new().unwrap();
    let db_path = db.path().join("index.db");

    let ctx = SearchContext::open(config(content.path(), &db_path, 384)).unwrap();
    index(&ctx).await;
    ctx.close().unwrap();

    let ctx = SearchContext::open(config(content.path(), &db_path, 768)).unwrap();
    ctx.clear().unwrap();
    let report = index(&ctx).await;
    assert_eq!(report.indexed, 3);
    assert_eq!(ctx.stats().unwrap().dimension, Some(768));
}

#[tokio::test]
async fn test_empty_query_and_hybrid_mode() {
    let content = fixture();
    let db = TempDir::new().unwrap();
    let ctx = SearchContext::open(config(content.path(), &db.path().join("index.db"), 384)).unwrap();
    index(&ctx).await;

    let engine = ctx.query_engine();
    assert!(engine.search("", 5, None).await.unwrap().is_empty());
    assert!(engine.search("docker", 0, None).await.unwrap().is_empty());

    let request = SearchRequest::new("dough", 3).with_mode(SearchMode::Hybrid);
    let results = engine
        .search_with(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].id(), "kitchen/bread");
    let ids: HashSet<_> = results.iter().map(|r| r.id()).collect();
    assert_eq!(ids.len(), results.len());
}

fn memory_context() -> SearchContext {
    let config = EngineConfig::builder().dimension(384).in_memory().build().unwrap();
    SearchContext::open(config).unwrap()
}

async fn index_static(ctx: &SearchContext, documents: Vec<Document>) {
    let report = ctx
        .pipeline()
        .run(&StaticCorpus::new(documents), &IndexOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_container_question_prefers_docker_doc() {
    let ctx = memory_context();
    index_static(
        &ctx,
        vec![
            Document::new("a", "Deploying with Docker", "containers and images"),
            Document::new("b", "Kubernetes scaling", "pods and autoscaling"),
            Document::new("c", "Baking bread", "flour and yeast"),
        ],
    )
    .await;

    let engine = ctx.query_engine();
    let query = "how do I run my app in a container";
    let results = engine.search(query, 3, None).await.unwrap();
    let position = |id: &str| results.iter().position(|r| r.id() == id).unwrap();
    assert_eq!(results.len(), 3);
    assert!(position("a") < position("c"));
    assert_eq!(results[0].id(), "a");
    assert!(results[0].similarity > 0.0);

    // Same query, same snapshot: same order and scores.
    let again = engine.search(query, 3, None).await.unwrap();
    let rows = |rs: &[docsearch::SearchResult]| {
        rs.iter().map(|r| (r.id().to_string(), r.similarity)).collect::<Vec<_>>()
    };
    assert_eq!(rows(&results), rows(&again));
}

#[tokio::test]
async fn test_every_title_finds_its_document() {
    let documents = vec![
        Document::new("how-to", "How to", "Step by step guide"),
        Document::new("docker", "Docker networking", "bridge overlay drivers"),
        Document::new("bread", "Baking sourdough bread", "flour water salt yeast"),
        Document::new("k8s", "Kubernetes pod scheduling", "nodes taints tolerations"),
    ];
    let ctx = memory_context();
    index_static(&ctx, documents.clone()).await;

    let engine = ctx.query_engine();
    for doc in &documents {
        let results = engine.search(&doc.title, documents.len(), None).await.unwrap();
        let hit = results
            .iter()
            .take(2)
            .find(|r| r.id() == doc.id)
            .unwrap_or_else(|| panic!("'{}' not in top 2 for its own title", doc.id));
        assert!(hit.similarity > 0.0, "'{}' scored {}", doc.id, hit.similarity);
    }
}
