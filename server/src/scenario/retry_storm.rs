//! Retry storm against a flaky dependency
//!
//! Each logical fetch makes up to `max_attempts` calls. The deadline applies
//! to every attempt separately, so a fetch can take up to
//! `max_attempts * per_attempt_timeout`. A timed-out attempt is retried at
//! once; any other error is retried after a linear backoff. There is no
//! circuit breaker and `batch_fetch` has no concurrency cap.

use bytes::Bytes;
use futures_util::future::join_all;
use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::dependency::Dependency;
use super::stats::{RetryStormStats, StatsAggregator};
use super::types::{AttemptError, AttemptOutcome, BatchReport, CallAttempt, RetryStormError};
use crate::config::RetryConfig;

/// Wait applied before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry straight away
    Immediate,
    /// Wait `attempt * unit`
    Linear { unit: Duration },
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Immediate => Duration::ZERO,
            Backoff::Linear { unit } => *unit * attempt,
        }
    }
}

/// Retry behaviour. Timeouts and errors have separate backoff policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Deadline of a single attempt; not shared across attempts
    pub per_attempt_timeout: Duration,
    pub on_timeout: Backoff,
    pub on_error: Backoff,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            per_attempt_timeout: config.per_attempt_timeout,
            on_timeout: Backoff::Immediate,
            on_error: Backoff::Linear {
                unit: config.backoff_unit,
            },
        }
    }
}

pub struct RetryStormEngine {
    dependency: Arc<dyn Dependency>,
    policy: RetryPolicy,
    stats: Arc<StatsAggregator>,
}

impl RetryStormEngine {
    pub fn new(
        dependency: Arc<dyn Dependency>,
        policy: RetryPolicy,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            dependency,
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            stats,
        }
    }

    /// Fetch one resource, retrying per policy
    pub async fn fetch_resource(&self, resource_id: &str) -> Result<Bytes, RetryStormError> {
        let start = Instant::now();
        // Released on every exit, including when the caller drops this future
        let _pending = PendingCall::start(&self.stats);

        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            let call = self.dependency.call(resource_id);
            let (error, backoff) =
                match tokio::time::timeout(self.policy.per_attempt_timeout, call).await {
                    Ok(Ok(data)) => {
                        trace_attempt(&CallAttempt {
                            resource_id: resource_id.to_string(),
                            attempt_number: attempt,
                            outcome: AttemptOutcome::Ok,
                        });
                        histogram!("faultlab_fetch_duration_seconds").record(start.elapsed());
                        return Ok(data);
                    }
                    Ok(Err(e)) => {
                        self.stats.record_failed_call();
                        counter!("faultlab_fetch_attempt_errors_total").increment(1);
                        trace_attempt(&CallAttempt {
                            resource_id: resource_id.to_string(),
                            attempt_number: attempt,
                            outcome: AttemptOutcome::Error,
                        });
                        (AttemptError::Dependency(e), self.policy.on_error)
                    }
                    Err(_) => {
                        self.stats.record_timed_out_call();
                        counter!("faultlab_fetch_attempt_timeouts_total").increment(1);
                        trace_attempt(&CallAttempt {
                            resource_id: resource_id.to_string(),
                            attempt_number: attempt,
                            outcome: AttemptOutcome::Timeout,
                        });
                        (
                            AttemptError::Timeout(self.policy.per_attempt_timeout),
                            self.policy.on_timeout,
                        )
                    }
                };

            if attempt >= self.policy.max_attempts {
                break error;
            }

            let delay = backoff.delay(attempt);
            if !delay.is_zero() {
                debug!(
                    "Backing off {:?} before attempt {} for {}",
                    delay,
                    attempt + 1,
                    resource_id
                );
                tokio::time::sleep(delay).await;
            }
        };

        histogram!("faultlab_fetch_duration_seconds").record(start.elapsed());
        counter!("faultlab_fetch_failures_total").increment(1);

        Err(RetryStormError::OperationFailed {
            resource_id: resource_id.to_string(),
            attempts: attempt,
            source: last_error,
        })
    }

    /// Fetch `n` resources at once with no concurrency limit
    pub async fn batch_fetch(self: &Arc<Self>, n: usize) -> BatchReport {
        let start = Instant::now();
        info!("Starting retry storm batch of {} fetches", n);

        let handles: Vec<_> = (0..n)
            .map(|i| {
                let engine = Arc::clone(self);
                tokio::spawn(async move {
                    let resource_id = format!("resource-{}", i);
                    match engine.fetch_resource(&resource_id).await {
                        Ok(_) => true,
                        Err(e) => {
                            warn!("{}", e);
                            false
                        }
                    }
                })
            })
            .collect();

        let mut report = BatchReport {
            requested: n,
            succeeded: 0,
            failed: 0,
        };
        for result in join_all(handles).await {
            match result {
                Ok(true) => report.succeeded += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!("Fetch worker failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Retry storm batch finished in {:?}: {} succeeded, {} failed",
            start.elapsed(),
            report.succeeded,
            report.failed
        );
        report
    }

    pub fn stats(&self) -> RetryStormStats {
        self.stats.retry_storm()
    }
}

/// One in-flight logical fetch, counted in `pending_calls` until dropped
struct PendingCall<'a> {
    stats: &'a StatsAggregator,
}

impl<'a> PendingCall<'a> {
    fn start(stats: &'a StatsAggregator) -> Self {
        stats.call_started();
        publish_pending(stats);
        Self { stats }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.stats.call_finished();
        publish_pending(self.stats);
    }
}

fn publish_pending(stats: &StatsAggregator) {
    gauge!("faultlab_pending_calls").set(stats.retry_storm().pending as f64);
}

fn trace_attempt(attempt: &CallAttempt) {
    debug!(
        "Fetch {} attempt {}: {:?}",
        attempt.resource_id, attempt.attempt_number, attempt.outcome
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::types::DependencyError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct NeverResponds;

    #[async_trait]
    impl Dependency for NeverResponds {
        async fn call(&self, _resource_id: &str) -> Result<Bytes, DependencyError> {
            std::future::pending().await
        }
    }

    struct AlwaysErrors;

    #[async_trait]
    impl Dependency for AlwaysErrors {
        async fn call(&self, resource_id: &str) -> Result<Bytes, DependencyError> {
            Err(DependencyError::Unavailable(resource_id.to_string()))
        }
    }

    /// Errors for the first `failures` calls, then succeeds
    struct RecoversAfter {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Dependency for RecoversAfter {
        async fn call(&self, resource_id: &str) -> Result<Bytes, DependencyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(DependencyError::Unavailable(resource_id.to_string()))
            } else {
                Ok(Bytes::from_static(b"ok"))
            }
        }
    }

    fn policy(timeout_ms: u64, unit_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_millis(timeout_ms),
            on_timeout: Backoff::Immediate,
            on_error: Backoff::Linear {
                unit: Duration::from_millis(unit_ms),
            },
        }
    }

    fn engine(dependency: Arc<dyn Dependency>, policy: RetryPolicy) -> Arc<RetryStormEngine> {
        Arc::new(RetryStormEngine::new(
            dependency,
            policy,
            Arc::new(StatsAggregator::new()),
        ))
    }

    #[test]
    fn test_backoff_delays() {
        let linear = Backoff::Linear {
            unit: Duration::from_millis(100),
        };
        assert_eq!(linear.delay(1), Duration::from_millis(100));
        assert_eq!(linear.delay(3), Duration::from_millis(300));
        assert_eq!(Backoff::Immediate.delay(5), Duration::ZERO);
    }

    #[test]
    fn test_policy_from_config_keeps_policies_separate() {
        let policy = RetryPolicy::from_config(&RetryConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.on_timeout, Backoff::Immediate);
        assert_eq!(
            policy.on_error,
            Backoff::Linear {
                unit: Duration::from_millis(100)
            }
        );
    }

    #[tokio::test]
    async fn test_timeouts_retry_immediately_with_full_budget_each() {
        // A large error backoff unit proves timeouts never use it.
        let engine = engine(Arc::new(NeverResponds), policy(50, 1_000));
        let start = Instant::now();

        let err = engine.fetch_resource("slow").await.unwrap_err();
        let elapsed = start.elapsed();

        let RetryStormError::OperationFailed {
            attempts, source, ..
        } = err;
        assert_eq!(attempts, 3);
        assert!(matches!(source, AttemptError::Timeout(_)));

        let stats = engine.stats();
        assert_eq!(stats.timeouts, 3);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.pending, 0);
        assert!(elapsed >= Duration::from_millis(150), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(900), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_errors_back_off_linearly() {
        let engine = engine(Arc::new(AlwaysErrors), policy(1_000, 40));
        let start = Instant::now();

        let err = engine.fetch_resource("broken").await.unwrap_err();

        // 40ms after attempt 1, 80ms after attempt 2, nothing after the last
        assert!(start.elapsed() >= Duration::from_millis(120));
        let RetryStormError::OperationFailed { source, .. } = err;
        assert!(matches!(source, AttemptError::Dependency(_)));
        let stats = engine.stats();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.timeouts, 0);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_recovers_within_attempt_budget() {
        let dependency = Arc::new(RecoversAfter {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let engine = engine(dependency.clone(), policy(1_000, 1));

        let data = engine.fetch_resource("flaky").await.unwrap();

        assert_eq!(data, Bytes::from_static(b"ok"));
        assert_eq!(dependency.calls.load(Ordering::SeqCst), 3);
        assert_eq!(engine.stats().failed, 2);
        assert_eq!(engine.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_releases_pending_call() {
        let engine = engine(Arc::new(NeverResponds), policy(200, 1));

        let fetch = engine.fetch_resource("abandoned");
        let cancelled = tokio::time::timeout(Duration::from_millis(20), fetch).await;

        assert!(cancelled.is_err());
        assert_eq!(engine.stats().pending, 0);
        assert_eq!(engine.stats().timeouts, 0);
    }

    #[tokio::test]
    async fn test_pending_counts_fetches_in_flight() {
        let engine = engine(Arc::new(NeverResponds), policy(200, 1));

        let worker = Arc::clone(&engine);
        let handle = tokio::spawn(async move { worker.fetch_resource("in-flight").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.stats().pending, 1);

        handle.abort();
        let _ = handle.await;
        assert_eq!(engine.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_batch_counts_every_item() {
        let dependency = Arc::new(RecoversAfter {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let engine = engine(dependency, policy(1_000, 1));

        let report = engine.batch_fetch(25).await;

        assert_eq!(report.requested, 25);
        assert_eq!(report.succeeded, 25);
        assert_eq!(report.failed, 0);
        let stats = engine.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(report.succeeded as u64 + stats.failed + stats.timeouts, 25);
    }

    #[tokio::test]
    async fn test_batch_failures_do_not_abort_siblings() {
        let engine = engine(
            Arc::new(NeverResponds),
            RetryPolicy {
                max_attempts: 1,
                ..policy(30, 1)
            },
        );

        let report = engine.batch_fetch(40).await;

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 40);
        let stats = engine.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.timeouts, 40);
        assert_eq!(report.succeeded as u64 + stats.failed + stats.timeouts, 40);
    }
}
