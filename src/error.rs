//! Error types for the indexing and search engine.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by embedding providers, vector stores, the indexing
/// pipeline and the query engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Network failure, 5xx or rate-limit rejection from a remote provider.
    #[error("Embedding provider unavailable ({provider}): {message}")]
    ProviderUnavailable { provider: String, message: String },

    /// Rejected credentials (401/403). Never retried.
    #[error("Embedding provider rejected credentials ({provider}): {message}")]
    ProviderAuthError { provider: String, message: String },

    /// Any other client-side rejection or malformed response.
    #[error("Embedding provider request failed ({provider}): {message}")]
    ProviderRequest { provider: String, message: String },

    /// The local model could not be initialised.
    #[error("Failed to load embedding model: {0}")]
    ModelLoadError(String),

    /// `create_schema` was called with a dimension different from the stored one.
    #[error("Index already exists with dimension {existing}, requested {requested}")]
    DimensionConflict { existing: usize, requested: usize },

    /// A vector's length does not match the index dimension.
    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The index was built by a different provider than the active one.
    #[error("Index was built with provider '{index}' but the active provider is '{active}'")]
    ProviderMismatch { index: String, active: String },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid document '{id}': {reason}")]
    InvalidDocument { id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// A fatal error that aborted an indexing run, tagged with the batch it hit.
    #[error("Batch {batch} ({first}..{last}) failed with provider {provider}: {source}")]
    BatchFailed {
        batch: usize,
        first: String,
        last: String,
        provider: String,
        #[source]
        source: Box<SearchError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Only transient provider failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }

    /// The underlying error, looking through batch context.
    pub fn root_cause(&self) -> &SearchError {
        match self {
            Self::BatchFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn unavailable(provider: &str, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn auth(provider: &str, message: impl Into<String>) -> Self {
        Self::ProviderAuthError {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn request(provider: &str, message: impl Into<String>) -> Self {
        Self::ProviderRequest {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, SearchError>;
