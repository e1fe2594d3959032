//! Semantic search engine
//!
//! - `embedding`: text → vector providers (local model, OpenAI, Gemini)
//! - `store`: vector stores (SQLite, in-memory)
//! - `pipeline`: corpus → stored records
//! - `engine`: query → ranked results
//! - `context`: wiring of the above from an `EngineConfig`

pub mod context;
pub mod embedding;
pub mod engine;
pub mod pipeline;
pub mod ratelimit;
pub mod retry;
pub mod store;
pub mod types;

pub use context::SearchContext;
pub use embedding::{cosine_similarity, EmbeddingProvider, Provider, ProviderKind};
pub use engine::{QueryEngine, SearchMode, SearchRequest};
pub use pipeline::{IndexOptions, IndexPipeline, IndexReport};
pub use ratelimit::RateLimiter;
pub use retry::RetryPolicy;
pub use store::{MemoryStore, SqliteStore, VectorStore};
pub use types::{IndexStats, IndexedRecord, MatchKind, SearchFilter, SearchResult, SearchResultRow};
