//! Embedding providers
//!
//! Every backend implements [`EmbeddingProvider`]. The set of backends the
//! engine can be configured with is closed ([`ProviderKind`]); [`Provider`]
//! dispatches over it. Each provider reports a `provider_tag` that is stamped
//! on every record it produces, and vectors are only ever compared with
//! vectors carrying the same tag.

pub mod gemini;
pub mod local;
pub mod openai;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::error::{Result, SearchError};
use crate::search::ratelimit::RateLimiter;

pub use gemini::GeminiProvider;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;

/// A backend that turns text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(SearchError::request(
                self.provider_tag(),
                "expected exactly one embedding",
            )),
        }
    }

    /// Embed a batch. Output order matches input order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output dimension `d`.
    fn dimension(&self) -> usize;

    /// Stable identifier of the backend, model and dimension.
    fn provider_tag(&self) -> &str;
}

/// The configurable provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Local,
    /// OpenAI-compatible `/embeddings` API.
    OpenAi,
    /// Google Generative Language `batchEmbedContents` API.
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Local)
    }

    pub fn default_dimension(&self) -> usize {
        match self {
            Self::Local => local::DEFAULT_DIMENSION,
            Self::OpenAi => openai::DEFAULT_DIMENSION,
            Self::Gemini => gemini::DEFAULT_DIMENSION,
        }
    }

    /// Documented requests-per-minute budget for the remote APIs.
    pub fn default_rate_limit_rpm(&self) -> Option<u32> {
        match self {
            Self::Local => None,
            Self::OpenAi => Some(3000),
            Self::Gemini => Some(1500),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" | "remotea" | "remote-a" => Ok(Self::OpenAi),
            "gemini" | "remoteb" | "remote-b" => Ok(Self::Gemini),
            other => Err(SearchError::Config(format!(
                "unknown embedding provider '{}' (expected local|openai|gemini)",
                other
            ))),
        }
    }
}

/// Closed set of providers, selected from configuration.
pub enum Provider {
    Local(LocalProvider),
    OpenAi(OpenAiProvider),
    Gemini(GeminiProvider),
}

impl Provider {
    /// Build the configured provider. Remote providers share `limiter`.
    pub fn from_config(config: &EngineConfig, limiter: Option<Arc<RateLimiter>>) -> Result<Self> {
        let dimension = config.dimension();
        match config.provider {
            ProviderKind::Local => Ok(Self::Local(LocalProvider::new(dimension)?)),
            ProviderKind::OpenAi => {
                let mut p = OpenAiProvider::new(required_key(config)?, dimension, config.request_timeout)?;
                if let Some(base) = &config.api_base {
                    p = p.with_base_url(base);
                }
                if let Some(model) = &config.model {
                    p = p.with_model(model);
                }
                if let Some(limiter) = limiter {
                    p = p.with_rate_limiter(limiter);
                }
                Ok(Self::OpenAi(p))
            }
            ProviderKind::Gemini => {
                let mut p = GeminiProvider::new(required_key(config)?, dimension, config.request_timeout)?;
                if let Some(base) = &config.api_base {
                    p = p.with_base_url(base);
                }
                if let Some(model) = &config.model {
                    p = p.with_model(model);
                }
                if let Some(limiter) = limiter {
                    p = p.with_rate_limiter(limiter);
                }
                Ok(Self::Gemini(p))
            }
        }
    }

    fn inner(&self) -> &dyn EmbeddingProvider {
        match self {
            Self::Local(p) => p,
            Self::OpenAi(p) => p,
            Self::Gemini(p) => p,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for Provider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner().embed(text).await
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner().embed_many(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner().dimension()
    }

    fn provider_tag(&self) -> &str {
        self.inner().provider_tag()
    }
}

fn required_key(config: &EngineConfig) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            SearchError::auth(
                config.provider.as_str(),
                "no API key configured (set DOCSEARCH_API_KEY)",
            )
        })
}

/// Verify a provider returned one vector of the expected size per input.
pub(crate) fn check_vectors(
    provider: &str,
    expected_dim: usize,
    inputs: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != inputs {
        return Err(SearchError::request(
            provider,
            format!("returned {} embeddings for {} inputs", vectors.len(), inputs),
        ));
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != expected_dim) {
        return Err(SearchError::DimensionMismatch {
            expected: expected_dim,
            actual: v.len(),
        });
    }
    Ok(())
}

/// Map an HTTP status from a remote provider onto the error taxonomy.
pub(crate) fn classify_status(provider: &str, status: reqwest::StatusCode, detail: String) -> SearchError {
    let message = format!("API returned {}: {}", status, detail);
    match status.as_u16() {
        401 | 403 => SearchError::auth(provider, message),
        408 | 429 => SearchError::unavailable(provider, message),
        s if s >= 500 => SearchError::unavailable(provider, message),
        _ => SearchError::request(provider, message),
    }
}

/// Map a transport error. Decoding failures are not transient.
pub(crate) fn classify_transport(provider: &str, err: reqwest::Error) -> SearchError {
    if err.is_decode() {
        SearchError::request(provider, format!("failed to parse response: {}", err))
    } else {
        SearchError::unavailable(provider, format!("request failed: {}", err))
    }
}

/// Cosine similarity between two embeddings.
///
/// A zero-norm vector is similar to nothing: the result is 0, never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
