//! Entry point for triggering scenarios and reading their counters

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::cache::CacheGrowthEngine;
use super::dependency::{Dependency, FlakyDependency};
use super::lock_order::{LockOrderEngine, SHARED_ITEM_ID};
use super::retry_storm::{RetryPolicy, RetryStormEngine};
use super::stats::{ScenarioStats, StatsAggregator};
use super::types::{BatchReport, SimulationOutcome};
use crate::config::Config;

/// Owns the three engines and the counters they share
pub struct ScenarioCoordinator {
    stats: Arc<StatsAggregator>,
    cache: Arc<CacheGrowthEngine>,
    lock_order: Arc<LockOrderEngine>,
    retry_storm: Arc<RetryStormEngine>,
    detection_timeout: Duration,
}

impl ScenarioCoordinator {
    /// Build every engine from configuration, using the flaky dependency
    pub fn new(config: &Config) -> Self {
        let dependency: Arc<dyn Dependency> = Arc::new(FlakyDependency::new(&config.dependency));
        Self::with_dependency(config, dependency)
    }

    /// Build every engine with a caller-supplied dependency
    pub fn with_dependency(config: &Config, dependency: Arc<dyn Dependency>) -> Self {
        let stats = Arc::new(StatsAggregator::new());
        let cache = Arc::new(CacheGrowthEngine::new(&config.cache));
        let lock_order = Arc::new(LockOrderEngine::new(&config.lock_order, stats.clone()));
        let retry_storm = Arc::new(RetryStormEngine::new(
            dependency,
            RetryPolicy::from_config(&config.retry),
            stats.clone(),
        ));

        Self {
            stats,
            cache,
            lock_order,
            retry_storm,
            detection_timeout: config.lock_order.detection_timeout,
        }
    }

    pub fn cache(&self) -> &Arc<CacheGrowthEngine> {
        &self.cache
    }

    pub fn lock_order(&self) -> &Arc<LockOrderEngine> {
        &self.lock_order
    }

    pub fn retry_storm(&self) -> &Arc<RetryStormEngine> {
        &self.retry_storm
    }

    /// Merge per-engine counters. Each engine is read consistently on its own;
    /// the merged view is not atomic across engines.
    pub async fn snapshot(&self) -> ScenarioStats {
        let cache = self.cache.stats().await;
        ScenarioStats::merge(cache, self.stats.lock_order(), self.stats.retry_storm())
    }

    /// One unit of work from each engine, in sequence
    pub async fn run_all(&self) -> ScenarioStats {
        info!("Running one unit of every scenario");

        self.cache.insert("run-all", None).await;

        let order_id = format!("RUN-ALL-{}", uuid::Uuid::new_v4().simple());
        let result = self
            .lock_order
            .process_order(&order_id, SHARED_ITEM_ID, 1)
            .await;
        info!("run-all order {}: {}", order_id, result.message);

        if let Err(e) = self.retry_storm.fetch_resource("run-all").await {
            warn!("run-all fetch failed: {}", e);
        }

        self.snapshot().await
    }

    /// Insert `count` leaked payloads
    pub async fn trigger_memory_leak(&self, count: usize) -> ScenarioStats {
        for i in 0..count {
            self.cache.insert(&format!("leak-{}", i), None).await;
        }
        self.snapshot().await
    }

    /// Race orders against restocks using the configured detection timeout
    pub async fn trigger_deadlock(
        &self,
        n_orders: usize,
        n_restocks: usize,
    ) -> (SimulationOutcome, ScenarioStats) {
        let outcome = self
            .lock_order
            .simulate_concurrent_operations(n_orders, n_restocks, self.detection_timeout)
            .await;
        (outcome, self.snapshot().await)
    }

    /// Fire `requests` concurrent fetches at the dependency
    pub async fn trigger_retry_storm(&self, requests: usize) -> (BatchReport, ScenarioStats) {
        let report = self.retry_storm.batch_fetch(requests).await;
        (report, self.snapshot().await)
    }
}
