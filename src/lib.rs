//! docsearch library
//!
//! Semantic indexing and search over document collections.
//!
//! # Modules
//!
//! - `core`: documents, corpus adapters (markdown directories), frontmatter
//! - `search`: embedding providers, vector stores, indexing pipeline, query engine
//! - `config`: `DOCSEARCH_*` configuration
//! - `mcp`: MCP server exposing search to AI assistants (feature `mcp`)

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod search;

// Re-exports for convenience
pub use config::{EngineConfig, StoreLocation};
pub use core::corpus::{CorpusAdapter, MarkdownCorpus, StaticCorpus};
pub use core::document::Document;
pub use error::{Result, SearchError};
pub use search::{
    EmbeddingProvider, IndexOptions, IndexPipeline, IndexReport, MatchKind, QueryEngine,
    SearchContext, SearchFilter, SearchMode, SearchRequest, SearchResult, VectorStore,
};
