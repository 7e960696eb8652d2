//! Coordinated start and stop of the background services.
//!
//! [`ServiceManager`] owns the only long-lived handles to the query cache,
//! the sync orchestrator and the retention cleaner, all sharing one
//! datastore, clock and metrics registry.

use std::sync::Arc;

use nodegraph_store::Datastore;
use nodegraph_types::{Clock, SystemClock};
use nodegraph_upstream::NodeSource;

use crate::config::ServicesConfig;
use crate::metrics::ServiceMetrics;
use crate::query_cache::QueryCache;
use crate::retention::RetentionCleaner;
use crate::sync::SyncOrchestrator;
use crate::ServiceError;

pub struct ServiceManager {
    cache: Arc<QueryCache>,
    sync: Arc<SyncOrchestrator>,
    retention: Arc<RetentionCleaner>,
    metrics: Arc<ServiceMetrics>,
}

impl ServiceManager {
    /// Build every service from `config`, reading time from the system clock.
    pub fn new(
        datastore: Arc<dyn Datastore>,
        source: Arc<dyn NodeSource>,
        config: &ServicesConfig,
    ) -> Result<Self, ServiceError> {
        Self::with_clock(datastore, source, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        datastore: Arc<dyn Datastore>,
        source: Arc<dyn NodeSource>,
        clock: Arc<dyn Clock>,
        config: &ServicesConfig,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let metrics = Arc::new(ServiceMetrics::new());

        let cache = Arc::new(QueryCache::new(
            Arc::clone(&datastore),
            Arc::clone(&clock),
            config.cache_settings(),
            Arc::clone(&metrics),
        ));
        let sync = Arc::new(SyncOrchestrator::new(
            Arc::clone(&datastore),
            source,
            Arc::clone(&clock),
            config.sync_settings(),
            Arc::clone(&metrics),
        ));
        let retention = Arc::new(RetentionCleaner::new(
            datastore,
            clock,
            config.cleanup_settings(),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            cache,
            sync,
            retention,
            metrics,
        })
    }

    /// Start periodic sync, then periodic cleanup. The cache needs no start.
    pub async fn initialize_services(&self) -> Result<(), ServiceError> {
        tracing::info!("initializing services");
        let result = async {
            self.sync.start_periodic_sync().await?;
            self.retention.start_periodic_cleanup().await
        }
        .await;

        match &result {
            Ok(()) => tracing::info!("services initialized"),
            Err(e) => tracing::error!(error = %e, "failed to initialize services"),
        }
        result
    }

    /// Stop sync, stop cleanup, then clear the cache.
    ///
    /// Every step is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub async fn shutdown_services(&self) -> Result<(), ServiceError> {
        tracing::info!("shutting down services");
        let sync = self.sync.stop_periodic_sync().await;
        if let Err(e) = &sync {
            tracing::error!(error = %e, "failed to stop periodic sync");
        }
        let cleanup = self.retention.stop_periodic_cleanup().await;
        if let Err(e) = &cleanup {
            tracing::error!(error = %e, "failed to stop periodic cleanup");
        }
        self.cache.clear_cache();

        sync.and(cleanup)?;
        tracing::info!("services stopped");
        Ok(())
    }

    /// Whether both periodic services are live.
    pub async fn is_running(&self) -> bool {
        self.sync.is_running().await && self.retention.is_running().await
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn sync(&self) -> &Arc<SyncOrchestrator> {
        &self.sync
    }

    pub fn retention(&self) -> &Arc<RetentionCleaner> {
        &self.retention
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodegraph_nullables::{NullDatastore, NullNodeSource};

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = ServicesConfig {
            retry_max_attempts: 0,
            ..Default::default()
        };
        let result = ServiceManager::new(
            Arc::new(NullDatastore::new()),
            Arc::new(NullNodeSource::new()),
            &config,
        );
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_then_shutdown_round_trip() {
        let manager = ServiceManager::new(
            Arc::new(NullDatastore::new()),
            Arc::new(NullNodeSource::new()),
            &ServicesConfig::default(),
        )
        .unwrap();
        assert!(!manager.is_running().await);

        manager.initialize_services().await.unwrap();
        assert!(manager.is_running().await);

        manager.shutdown_services().await.unwrap();
        assert!(!manager.is_running().await);
    }
}
