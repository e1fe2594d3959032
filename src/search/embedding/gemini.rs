//! Gemini embedding provider using the Generative Language REST API.
//!
//! Calls `POST {base}/models/{model}:batchEmbedContents`, which accepts up to
//! 100 requests per call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{check_vectors, classify_status, classify_transport, EmbeddingProvider};
use crate::error::{Result, SearchError};
use crate::search::ratelimit::RateLimiter;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "text-embedding-004";
pub const DEFAULT_DIMENSION: usize = 768;

const PROVIDER: &str = "gemini";
const MAX_REQUESTS_PER_BATCH: usize = 100;

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
    limiter: Option<Arc<RateLimiter>>,
    tag: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, dimension: usize, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::auth(PROVIDER, "API key must not be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimension,
            limiter: None,
            tag: make_tag(DEFAULT_MODEL, dimension),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = model.trim_start_matches("models/").to_string();
        self.tag = make_tag(&self.model, self.dimension);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let model_ref = format!("models/{}", self.model);
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| EmbedContentRequest {
                    model: &model_ref,
                    content: Content {
                        parts: vec![Part { text: t }],
                    },
                    output_dimensionality: Some(self.dimension),
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/{}:batchEmbedContents", self.base_url, model_ref))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                classify_transport(PROVIDER, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            error!(provider = PROVIDER, %status, "API error");
            return Err(classify_status(PROVIDER, status, detail));
        }

        let parsed: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| classify_transport(PROVIDER, e))?;

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

fn make_tag(model: &str, dimension: usize) -> String {
    format!("{}:{}:{}", PROVIDER, model, dimension)
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_REQUESTS_PER_BATCH) {
            let vectors = self.request(chunk).await?;
            check_vectors(&self.tag, self.dimension, chunk.len(), &vectors)?;
            out.extend(vectors);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_tag(&self) -> &str {
        &self.tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new("g-key", 3, Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_batch_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:batchEmbedContents"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "requests": [
                    {"model": "models/text-embedding-004", "outputDimensionality": 3,
                     "content": {"parts": [{"text": "a"}]}},
                    {"model": "models/text-embedding-004", "outputDimensionality": 3,
                     "content": {"parts": [{"text": "b"}]}}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [{"values": [1.0, 0.0, 0.0]}, {"values": [0.0, 1.0, 0.0]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server);
        let out = p.embed_many(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], vec![0.0, 1.0, 0.0]);
        assert_eq!(p.provider_tag(), "gemini:text-embedding-004:3");
    }

    #[tokio::test]
    async fn test_forbidden_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).embed("x").await.unwrap_err();
        assert!(matches!(err, SearchError::ProviderAuthError { .. }));
        assert!(err.to_string().contains("API key not valid"));
    }

    #[tokio::test]
    async fn test_rate_limited_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server).embed("x").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_model_prefix_normalized() {
        let p = GeminiProvider::new("k", 768, Duration::from_secs(1))
            .unwrap()
            .with_model("models/gemini-embedding-001");
        assert_eq!(p.provider_tag(), "gemini:gemini-embedding-001:768");
    }
}
