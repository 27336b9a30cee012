//! Service health derived from the scenario counters

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Instant;

use crate::scenario::{ScenarioAppState, ScenarioStats};

/// Application start time for uptime calculation
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// In-flight fetches above which the service reports itself degraded
pub const DEGRADED_PENDING_CALLS: i64 = 100;

/// Record the process start. Later calls keep the first instant.
pub fn mark_started() {
    START_TIME.set(Instant::now()).ok();
}

/// Seconds since `mark_started`, or 0 if it was never called
pub fn uptime_seconds() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub abandoned_workers: u64,
    pub pending_calls: i64,
    pub uptime_seconds: u64,
}

/// Blocked lock-order workers never recover, so any of them means degraded
pub fn is_healthy(stats: &ScenarioStats) -> bool {
    stats.abandoned_workers == 0 && stats.pending_calls <= DEGRADED_PENDING_CALLS
}

/// GET /health
pub async fn health(State(state): State<ScenarioAppState>) -> (StatusCode, Json<HealthResponse>) {
    let stats = state.coordinator.snapshot().await;

    let (status, http_status) = if is_healthy(&stats) {
        ("healthy", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            abandoned_workers: stats.abandoned_workers,
            pending_calls: stats.pending_calls,
            uptime_seconds: uptime_seconds(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(abandoned_workers: u64, pending_calls: i64) -> ScenarioStats {
        ScenarioStats {
            cache_entries: 0,
            cache_bytes: 0,
            successful_orders: 0,
            deadlock_detections: 0,
            abandoned_workers,
            pending_calls,
            failed_calls: 0,
            timed_out_calls: 0,
        }
    }

    #[test]
    fn test_idle_service_is_healthy() {
        assert!(is_healthy(&stats(0, 0)));
        assert!(is_healthy(&stats(0, DEGRADED_PENDING_CALLS)));
    }

    #[test]
    fn test_abandoned_workers_degrade() {
        assert!(!is_healthy(&stats(1, 0)));
    }

    #[test]
    fn test_pending_backlog_degrades() {
        assert!(!is_healthy(&stats(0, DEGRADED_PENDING_CALLS + 1)));
    }
}
