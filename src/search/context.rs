//! Wiring of provider, rate limiter and store for one engine instance.

use std::sync::Arc;

use tracing::{debug, info};

use super::embedding::{EmbeddingProvider, Provider};
use super::engine::QueryEngine;
use super::pipeline::IndexPipeline;
use super::ratelimit::RateLimiter;
use super::store::{MemoryStore, SqliteStore, VectorStore};
use super::types::IndexStats;
use crate::config::{EngineConfig, StoreLocation};
use crate::error::Result;

/// Owns the shared components. Pipelines and query engines handed out by the
/// same context use the same provider and store.
pub struct SearchContext {
    config: EngineConfig,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl SearchContext {
    /// Build the rate limiter, provider and store described by `config`.
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let limiter = config.rate_limit().map(|rpm| Arc::new(RateLimiter::per_minute(rpm)));
        let provider = Provider::from_config(&config, limiter)?;

        let store = Self::open_store(&config)?;

        info!(
            provider = provider.provider_tag(),
            store = ?config.store,
            "search context opened"
        );
        Ok(Self {
            config,
            provider: Arc::new(provider),
            store,
        })
    }

    /// Open only the configured store, for read-only commands that never embed.
    pub fn open_store(config: &EngineConfig) -> Result<Arc<dyn VectorStore>> {
        Ok(match &config.store {
            StoreLocation::Memory => Arc::new(MemoryStore::new()),
            StoreLocation::File(path) => Arc::new(SqliteStore::open(path)?),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> Arc<dyn EmbeddingProvider> {
        self.provider.clone()
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    pub fn pipeline(&self) -> IndexPipeline {
        IndexPipeline::new(self.provider.clone(), self.store.clone())
            .with_batch_size(self.config.batch_size)
            .with_workers(self.config.workers)
            .with_retry(self.config.retry_policy())
    }

    pub fn query_engine(&self) -> QueryEngine {
        QueryEngine::new(self.provider.clone(), self.store.clone())
            .with_timeout(self.config.query_timeout)
            .with_min_similarity(self.config.min_similarity)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        self.store.stats()
    }

    /// Drop the whole index, e.g. before rebuilding with another provider.
    pub fn clear(&self) -> Result<()> {
        info!("clearing index");
        self.store.clear()
    }

    pub fn close(self) -> Result<()> {
        debug!("closing search context");
        self.store.close()
    }
}
