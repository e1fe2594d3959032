//! Corpus adapters - supply documents to the indexing pipeline

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::document::Document;
use super::frontmatter::{first_heading, strip_frontmatter, Frontmatter};
use crate::error::Result;

/// Source of indexable documents.
pub trait CorpusAdapter: Send + Sync {
    /// Enumerate every document currently in the corpus.
    fn documents(&self) -> Result<Vec<Document>>;
}

/// A fixed, in-memory list of documents.
#[derive(Debug, Clone, Default)]
pub struct StaticCorpus {
    documents: Vec<Document>,
}

impl StaticCorpus {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn push(&mut self, document: Document) {
        self.documents.push(document);
    }

    /// Remove a document by id, returning whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.documents.len();
        self.documents.retain(|d| d.id != id);
        self.documents.len() != before
    }
}

impl CorpusAdapter for StaticCorpus {
    fn documents(&self) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }
}

/// Markdown files under a root directory.
///
/// - id: path relative to the root, without extension, `/`-separated
/// - title: frontmatter `title`, else the first `# ` heading, else the file stem
/// - folder: the first directory component, never frontmatter
/// - tags: frontmatter `tags`
pub struct MarkdownCorpus {
    root: PathBuf,
}

impl MarkdownCorpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a single markdown file as a document.
    pub fn load(&self, path: &Path) -> Result<Document> {
        let content = fs::read_to_string(path)?;
        let rel = path.strip_prefix(&self.root).unwrap_or(path);

        let id = document_id(rel);
        let frontmatter = Frontmatter::parse(&content).unwrap_or_default();
        let body = strip_frontmatter(&content).trim().to_string();

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        let title = frontmatter
            .title
            .or_else(|| first_heading(&body))
            .unwrap_or(stem);

        Ok(Document {
            id,
            title,
            body,
            folder: top_folder(rel),
            tags: frontmatter.tags,
        })
    }
}

impl CorpusAdapter for MarkdownCorpus {
    fn documents(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        if !self.root.exists() {
            warn!(root = %self.root.display(), "content directory does not exist");
            return Ok(documents);
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !path.extension().map(|e| e == "md").unwrap_or(false) {
                continue;
            }
            match self.load(path) {
                Ok(doc) => documents.push(doc),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
            }
        }

        documents.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(root = %self.root.display(), count = documents.len(), "enumerated corpus");
        Ok(documents)
    }
}

/// Dot-prefixed directories (`.git`, `.docsearch`).
fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn document_id(rel: &Path) -> String {
    let without_ext = rel.with_extension("");
    without_ext
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn top_folder(rel: &Path) -> Option<String> {
    let mut components = rel.components();
    let first = components.next()?;
    // A bare file name has no folder.
    components.next()?;
    match first {
        Component::Normal(s) => s.to_str().map(String::from),
        _ => None,
    }
}
