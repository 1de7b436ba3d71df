//! Cache lifecycle
//!
//! Wires the store, pipeline and pruner together in startup order and tears
//! them down in reverse.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::market::MarketOracle;
use crate::pipeline::{FetchPipeline, MarketDataSource, PipelineOptions};
use crate::storage::PersistentTier;
use crate::tasks::spawn_prune_task;

/// A running cache: pipeline plus its background pruner.
pub struct MarketCache {
    pipeline: FetchPipeline,
    prune_handle: JoinHandle<()>,
}

impl MarketCache {
    /// Starts the cache.
    ///
    /// # Startup Sequence
    /// 1. Validate the configured TTLs
    /// 2. Open the persistent store (memory-only if that fails)
    /// 3. Build the fetch pipeline
    /// 4. Warm the memory tier from the store
    /// 5. Start the background prune task
    pub async fn start(config: &Config, source: Arc<dyn MarketDataSource>) -> Result<Self> {
        let policy = config.ttl_policy()?;
        info!(
            "Starting market cache: store={}, retention={:?}, metadata_refresh={}",
            config.db_path.display(),
            config.retention,
            config.metadata_refresh
        );

        let persistent = Arc::new(PersistentTier::open(&config.db_path, config.persistent_options()));

        let pipeline = FetchPipeline::new(
            source,
            persistent.clone(),
            PipelineOptions {
                policy,
                oracle: MarketOracle::new(),
                metadata_refresh: config.metadata_refresh,
                warm_window: config.warm_window,
            },
        );
        pipeline.warm_up().await;

        let prune_handle = spawn_prune_task(persistent, config.prune_settings());
        info!("Background prune task started");

        Ok(Self {
            pipeline,
            prune_handle,
        })
    }

    pub fn pipeline(&self) -> &FetchPipeline {
        &self.pipeline
    }

    /// Stops the pruner, then closes the store after queued writes land.
    pub async fn shutdown(self) -> Result<()> {
        self.prune_handle.abort();
        info!("Prune task aborted");

        self.pipeline.shutdown().await?;
        info!("Market cache shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Category;
    use crate::error::{CacheError, FetchError};
    use crate::pipeline::BatchResponse;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Unreachable;

    #[async_trait]
    impl MarketDataSource for Unreachable {
        async fn fetch_batch(
            &self,
            _category: Category,
            _symbols: &[String],
            _granularity: Option<&crate::cache::Granularity>,
        ) -> std::result::Result<BatchResponse, FetchError> {
            Err(FetchError::NetworkFailure)
        }
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            db_path: dir.path().join("cache.db"),
            ..Config::default()
        };

        let cache = MarketCache::start(&config, Arc::new(Unreachable)).await.unwrap();
        let result = cache.pipeline().fetch(Category::Price, ["AAPL"], None, false).await;
        assert_eq!(result.error("AAPL"), Some(FetchError::NetworkFailure));

        cache.shutdown().await.unwrap();
        assert!(config.db_path.exists());
    }

    #[tokio::test]
    async fn test_start_rejects_inverted_ttls() {
        let mut config = Config::default();
        config.price_ttl.open = config.price_ttl.closed * 2;

        let result = MarketCache::start(&config, Arc::new(Unreachable)).await;
        assert!(matches!(result, Err(CacheError::Config(_))));
    }
}
