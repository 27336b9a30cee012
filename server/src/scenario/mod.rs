//! Failure scenario engines
//!
//! This module provides:
//! - `CacheGrowthEngine`, a cache that never evicts (memory leak)
//! - `LockOrderEngine`, two ledgers locked in opposite orders (ABBA deadlock)
//! - `RetryStormEngine`, uncapped retries against a flaky dependency (timeout cascade)
//! - `ScenarioCoordinator`, which owns the engines and merges their counters
//! - HTTP routes that trigger scenarios and expose stats

mod cache;
mod coordinator;
mod dependency;
mod lock_order;
mod retry_storm;
pub mod routes;
mod stats;
mod types;

pub use cache::{CacheEntry, CacheGrowthEngine};
pub use coordinator::ScenarioCoordinator;
pub use dependency::{Dependency, FlakyDependency};
pub use lock_order::{LockOrderEngine, SHARED_ITEM_ID};
pub use retry_storm::{Backoff, RetryPolicy, RetryStormEngine};
pub use routes::{ScenarioAppState, scenario_routes};
pub use stats::{CacheStats, LockOrderStats, RetryStormStats, ScenarioStats, StatsAggregator};
pub use types::{
    AttemptError, BatchReport, DependencyError, OrderRecord, OrderResult, OrderStatus,
    RetryStormError, SimulationOutcome,
};
