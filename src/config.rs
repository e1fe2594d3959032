//! Engine configuration
//!
//! Read from `DOCSEARCH_*` environment variables (see [`EngineConfig::from_env`])
//! or assembled programmatically with [`EngineConfig::builder`]. Values are
//! read through a lookup function so tests never touch the process
//! environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SearchError};
use crate::search::embedding::ProviderKind;
use crate::search::retry::RetryPolicy;

pub const ENV_PROVIDER: &str = "DOCSEARCH_PROVIDER";
pub const ENV_API_KEY: &str = "DOCSEARCH_API_KEY";
pub const ENV_API_BASE: &str = "DOCSEARCH_API_BASE";
pub const ENV_MODEL: &str = "DOCSEARCH_MODEL";
pub const ENV_DIMENSION: &str = "DOCSEARCH_DIMENSION";
pub const ENV_BATCH_SIZE: &str = "DOCSEARCH_BATCH_SIZE";
pub const ENV_WORKERS: &str = "DOCSEARCH_WORKERS";
pub const ENV_RATE_LIMIT_RPM: &str = "DOCSEARCH_RATE_LIMIT_RPM";
pub const ENV_MAX_RETRIES: &str = "DOCSEARCH_MAX_RETRIES";
pub const ENV_RETRY_MIN_DELAY_MS: &str = "DOCSEARCH_RETRY_MIN_DELAY_MS";
pub const ENV_RETRY_MAX_DELAY_MS: &str = "DOCSEARCH_RETRY_MAX_DELAY_MS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "DOCSEARCH_REQUEST_TIMEOUT_SECS";
pub const ENV_QUERY_TIMEOUT_SECS: &str = "DOCSEARCH_QUERY_TIMEOUT_SECS";
pub const ENV_DB_PATH: &str = "DOCSEARCH_DB_PATH";
pub const ENV_CONTENT_DIR: &str = "DOCSEARCH_CONTENT_DIR";
pub const ENV_MIN_SIMILARITY: &str = "DOCSEARCH_MIN_SIMILARITY";

/// Default index location, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".docsearch/index.db";
const MEMORY_DB: &str = ":memory:";

const MAX_DIMENSION: usize = 65_536;

/// Where the vector store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

impl StoreLocation {
    pub fn parse(value: &str) -> Self {
        if value.trim() == MEMORY_DB {
            Self::Memory
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

impl Default for StoreLocation {
    fn default() -> Self {
        Self::File(PathBuf::from(DEFAULT_DB_PATH))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: Option<String>,
    /// Explicit dimension; `None` uses the provider default.
    pub dimension: Option<usize>,
    pub batch_size: usize,
    pub workers: usize,
    /// Explicit rate limit; `None` uses the provider default.
    pub rate_limit_rpm: Option<u32>,
    pub max_retries: u32,
    pub retry_min_delay: Duration,
    pub retry_max_delay: Duration,
    pub request_timeout: Duration,
    pub query_timeout: Duration,
    pub store: StoreLocation,
    pub content_dir: PathBuf,
    pub min_similarity: Option<f32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            provider: ProviderKind::Local,
            api_key: None,
            api_base: None,
            model: None,
            dimension: None,
            batch_size: 32,
            workers: 4,
            rate_limit_rpm: None,
            max_retries: retry.max_retries,
            retry_min_delay: retry.min_delay,
            retry_max_delay: retry.max_delay,
            request_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(15),
            store: StoreLocation::default(),
            content_dir: PathBuf::from("."),
            min_similarity: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source. Unset and blank values fall
    /// back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(v) = get(ENV_PROVIDER) {
            config.provider = v.parse()?;
        }
        config.api_key = get(ENV_API_KEY).or_else(|| match config.provider {
            ProviderKind::OpenAi => get("OPENAI_API_KEY"),
            ProviderKind::Gemini => get("GEMINI_API_KEY"),
            ProviderKind::Local => None,
        });
        config.api_base = get(ENV_API_BASE);
        config.model = get(ENV_MODEL);
        config.dimension = parse_opt(ENV_DIMENSION, get(ENV_DIMENSION))?;
        if let Some(n) = parse_opt(ENV_BATCH_SIZE, get(ENV_BATCH_SIZE))? {
            config.batch_size = n;
        }
        if let Some(n) = parse_opt(ENV_WORKERS, get(ENV_WORKERS))? {
            config.workers = n;
        }
        config.rate_limit_rpm = parse_opt(ENV_RATE_LIMIT_RPM, get(ENV_RATE_LIMIT_RPM))?;
        if let Some(n) = parse_opt(ENV_MAX_RETRIES, get(ENV_MAX_RETRIES))? {
            config.max_retries = n;
        }
        if let Some(ms) = parse_opt(ENV_RETRY_MIN_DELAY_MS, get(ENV_RETRY_MIN_DELAY_MS))? {
            config.retry_min_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_opt(ENV_RETRY_MAX_DELAY_MS, get(ENV_RETRY_MAX_DELAY_MS))? {
            config.retry_max_delay = Duration::from_millis(ms);
        }
        if let Some(s) = parse_opt(ENV_REQUEST_TIMEOUT_SECS, get(ENV_REQUEST_TIMEOUT_SECS))? {
            config.request_timeout = Duration::from_secs(s);
        }
        if let Some(s) = parse_opt(ENV_QUERY_TIMEOUT_SECS, get(ENV_QUERY_TIMEOUT_SECS))? {
            config.query_timeout = Duration::from_secs(s);
        }
        if let Some(v) = get(ENV_DB_PATH) {
            config.store = StoreLocation::parse(&v);
        }
        if let Some(v) = get(ENV_CONTENT_DIR) {
            config.content_dir = PathBuf::from(v);
        }
        config.min_similarity = parse_opt(ENV_MIN_SIMILARITY, get(ENV_MIN_SIMILARITY))?;

        config.validate()?;
        Ok(config)
    }

    /// Effective vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
            .unwrap_or_else(|| self.provider.default_dimension())
    }

    /// Effective requests-per-minute budget. Always `None` for the local provider.
    pub fn rate_limit(&self) -> Option<u32> {
        if !self.provider.is_remote() {
            return None;
        }
        self.rate_limit_rpm
            .or_else(|| self.provider.default_rate_limit_rpm())
            .filter(|rpm| *rpm > 0)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            min_delay: self.retry_min_delay,
            max_delay: self.retry_max_delay,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let dimension = self.dimension();
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(invalid(ENV_DIMENSION, format!("{} is out of range 1..={}", dimension, MAX_DIMENSION)));
        }
        if self.batch_size == 0 {
            return Err(invalid(ENV_BATCH_SIZE, "must be at least 1"));
        }
        if self.workers == 0 {
            return Err(invalid(ENV_WORKERS, "must be at least 1"));
        }
        if self.retry_min_delay > self.retry_max_delay {
            return Err(invalid(
                ENV_RETRY_MIN_DELAY_MS,
                format!(
                    "{:?} exceeds the maximum delay {:?}",
                    self.retry_min_delay, self.retry_max_delay
                ),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid(ENV_REQUEST_TIMEOUT_SECS, "must be positive"));
        }
        if self.query_timeout.is_zero() {
            return Err(invalid(ENV_QUERY_TIMEOUT_SECS, "must be positive"));
        }
        if let Some(min) = self.min_similarity {
            if !(-1.0..=1.0).contains(&min) {
                return Err(invalid(ENV_MIN_SIMILARITY, format!("{} is outside [-1, 1]", min)));
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: impl std::fmt::Display) -> SearchError {
    SearchError::Config(format!("{}: {}", key, reason))
}

fn parse_opt<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| invalid(key, format!("invalid value '{}'", v)))
        })
        .transpose()
}

/// Programmatic construction with the same validation as `from_env`.
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = Some(base.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn dimension(mut self, dimension: usize) -> Self {
        self.config.dimension = Some(dimension);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn rate_limit_rpm(mut self, rpm: u32) -> Self {
        self.config.rate_limit_rpm = Some(rpm);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.max_retries = policy.max_retries;
        self.config.retry_min_delay = policy.min_delay;
        self.config.retry_max_delay = policy.max_delay;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    pub fn store(mut self, store: StoreLocation) -> Self {
        self.config.store = store;
        self
    }

    pub fn in_memory(self) -> Self {
        self.store(StoreLocation::Memory)
    }

    pub fn content_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.content_dir = dir.into();
        self
    }

    pub fn min_similarity(mut self, min: f32) -> Self {
        self.config.min_similarity = Some(min);
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
