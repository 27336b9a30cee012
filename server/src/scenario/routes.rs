//! HTTP route handlers for scenario triggers and stats

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use super::coordinator::ScenarioCoordinator;
use super::stats::ScenarioStats;
use super::types::{BatchReport, OrderRecord, OrderResult, RetryStormError, SimulationOutcome};

const MAX_LEAK_COUNT: usize = 100;
const MAX_DEADLOCK_WORKERS: usize = 200;
const MAX_STORM_REQUESTS: usize = 1000;

/// Application state containing the scenario coordinator
#[derive(Clone)]
pub struct ScenarioAppState {
    pub coordinator: Arc<ScenarioCoordinator>,
}

/// Errors returned by scenario routes
#[derive(Debug, Error)]
pub enum ScenarioApiError {
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Upstream(#[from] RetryStormError),
}

/// Error response for scenario API
#[derive(Debug, Serialize)]
pub struct ScenarioErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<ScenarioApiError> for ScenarioErrorResponse {
    fn from(e: ScenarioApiError) -> Self {
        let code = match &e {
            ScenarioApiError::InvalidParameter { .. } => "invalid_parameter",
            ScenarioApiError::NotFound(_) => "not_found",
            ScenarioApiError::Conflict(_) => "conflict",
            ScenarioApiError::Upstream(_) => "upstream_failed",
        };
        Self {
            error: e.to_string(),
            code: code.to_string(),
        }
    }
}

impl IntoResponse for ScenarioErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "invalid_parameter" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "upstream_failed" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Check a count parameter against `1..=max`, falling back to `default`
fn bounded(
    name: &'static str,
    value: Option<usize>,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, ScenarioErrorResponse> {
    let value = value.unwrap_or(default);
    if value < min || value > max {
        return Err(ScenarioApiError::InvalidParameter {
            name,
            reason: format!("must be between {} and {}, got {}", min, max, value),
        }
        .into());
    }
    Ok(value)
}

#[derive(Debug, Deserialize)]
pub struct MemoryLeakParams {
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DeadlockParams {
    pub orders: Option<usize>,
    pub restocks: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RetryStormParams {
    pub requests: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemoryLeakResponse {
    pub inserted: usize,
    pub stats: ScenarioStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeadlockResponse {
    pub simulation: SimulationOutcome,
    pub stats: ScenarioStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetryStormResponse {
    pub report: BatchReport,
    pub stats: ScenarioStats,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub order_id: String,
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub item_id: String,
    pub quantity: u32,
    #[serde(default = "default_restock_reason")]
    pub reason: String,
}

fn default_restock_reason() -> String {
    "manual".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InventoryResponse {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntryResponse {
    pub key: String,
    pub size_bytes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub resource_id: String,
    pub size_bytes: usize,
}

/// GET /api/stats - Unified counters
pub async fn get_stats(State(state): State<ScenarioAppState>) -> Json<ScenarioStats> {
    Json(state.coordinator.snapshot().await)
}

/// POST /api/scenarios/memory-leak - Insert payloads that are never freed
pub async fn trigger_memory_leak(
    State(state): State<ScenarioAppState>,
    Query(params): Query<MemoryLeakParams>,
) -> Result<Json<MemoryLeakResponse>, ScenarioErrorResponse> {
    let count = bounded("count", params.count, 1, 1, MAX_LEAK_COUNT)?;
    tracing::info!("Memory leak triggered: {} inserts", count);

    let stats = state.coordinator.trigger_memory_leak(count).await;
    Ok(Json(MemoryLeakResponse {
        inserted: count,
        stats,
    }))
}

/// POST /api/scenarios/deadlock - Race orders against restocks
pub async fn trigger_deadlock(
    State(state): State<ScenarioAppState>,
    Query(params): Query<DeadlockParams>,
) -> Result<Json<DeadlockResponse>, ScenarioErrorResponse> {
    let orders = bounded("orders", params.orders, 5, 0, MAX_DEADLOCK_WORKERS)?;
    let restocks = bounded("restocks", params.restocks, 5, 0, MAX_DEADLOCK_WORKERS)?;
    tracing::info!(
        "Deadlock scenario triggered: {} orders, {} restocks",
        orders,
        restocks
    );

    let (simulation, stats) = state.coordinator.trigger_deadlock(orders, restocks).await;
    Ok(Json(DeadlockResponse { simulation, stats }))
}

/// POST /api/scenarios/retry-storm - Uncapped concurrent fetches
pub async fn trigger_retry_storm(
    State(state): State<ScenarioAppState>,
    Query(params): Query<RetryStormParams>,
) -> Result<Json<RetryStormResponse>, ScenarioErrorResponse> {
    let requests = bounded("requests", params.requests, 10, 1, MAX_STORM_REQUESTS)?;
    tracing::info!("Retry storm triggered: {} requests", requests);

    let (report, stats) = state.coordinator.trigger_retry_storm(requests).await;
    Ok(Json(RetryStormResponse { report, stats }))
}

/// POST /api/scenarios/run-all - One unit of every scenario
pub async fn run_all(State(state): State<ScenarioAppState>) -> Json<ScenarioStats> {
    Json(state.coordinator.run_all().await)
}

/// POST /api/orders - Process a single order
pub async fn process_order(
    State(state): State<ScenarioAppState>,
    Json(request): Json<OrderRequest>,
) -> Json<OrderResult> {
    let result = state
        .coordinator
        .lock_order()
        .process_order(&request.order_id, &request.item_id, request.quantity)
        .await;
    Json(result)
}

/// POST /api/orders/backorder - Record an order waiting for stock
pub async fn place_backorder(
    State(state): State<ScenarioAppState>,
    Json(request): Json<OrderRequest>,
) -> Result<StatusCode, ScenarioErrorResponse> {
    let recorded = state
        .coordinator
        .lock_order()
        .place_backorder(&request.order_id, &request.item_id, request.quantity)
        .await;
    if !recorded {
        return Err(
            ScenarioApiError::Conflict(format!("order {} already exists", request.order_id)).into(),
        );
    }
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/orders - Order ledger in insertion order
pub async fn list_orders(State(state): State<ScenarioAppState>) -> Json<Vec<OrderRecord>> {
    Json(state.coordinator.lock_order().orders().await)
}

/// POST /api/inventory/restock - Add stock to an item
pub async fn restock_inventory(
    State(state): State<ScenarioAppState>,
    Json(request): Json<RestockRequest>,
) -> Json<InventoryResponse> {
    let engine = state.coordinator.lock_order();
    engine
        .restock_inventory(&request.item_id, request.quantity, &request.reason)
        .await;
    let quantity = engine.inventory_level(&request.item_id).await;
    Json(InventoryResponse {
        item_id: request.item_id,
        quantity,
    })
}

/// GET /api/inventory/:item_id - Current stock
pub async fn get_inventory(
    State(state): State<ScenarioAppState>,
    Path(item_id): Path<String>,
) -> Json<InventoryResponse> {
    let quantity = state.coordinator.lock_order().inventory_level(&item_id).await;
    Json(InventoryResponse { item_id, quantity })
}

/// GET /api/cache/:key - Read a cached payload
pub async fn get_cache_entry(
    State(state): State<ScenarioAppState>,
    Path(key): Path<String>,
) -> Result<Json<CacheEntryResponse>, ScenarioErrorResponse> {
    let payload = state
        .coordinator
        .cache()
        .get(&key)
        .await
        .ok_or_else(|| ScenarioApiError::NotFound(format!("cache key {}", key)))?;

    Ok(Json(CacheEntryResponse {
        key,
        size_bytes: payload.len(),
    }))
}

/// GET /api/resources/:id - Fetch a resource through the retrying client
pub async fn fetch_resource(
    State(state): State<ScenarioAppState>,
    Path(id): Path<String>,
) -> Result<Json<ResourceResponse>, ScenarioErrorResponse> {
    let data = state
        .coordinator
        .retry_storm()
        .fetch_resource(&id)
        .await
        .map_err(|e| {
            tracing::warn!("Resource fetch failed: {}", e);
            ScenarioErrorResponse::from(ScenarioApiError::from(e))
        })?;

    Ok(Json(ResourceResponse {
        resource_id: id,
        size_bytes: data.len(),
    }))
}

/// Build scenario API routes
pub fn scenario_routes(state: ScenarioAppState) -> Router {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/scenarios/memory-leak", post(trigger_memory_leak))
        .route("/scenarios/deadlock", post(trigger_deadlock))
        .route("/scenarios/retry-storm", post(trigger_retry_storm))
        .route("/scenarios/run-all", post(run_all))
        .route("/orders", get(list_orders).post(process_order))
        .route("/orders/backorder", post(place_backorder))
        .route("/inventory/restock", post(restock_inventory))
        .route("/inventory/:item_id", get(get_inventory))
        .route("/cache/:key", get(get_cache_entry))
        .route("/resources/:id", get(fetch_resource))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_defaults_and_limits() {
        assert_eq!(bounded("count", None, 1, 1, 10).unwrap(), 1);
        assert_eq!(bounded("count", Some(10), 1, 1, 10).unwrap(), 10);

        let err = bounded("count", Some(0), 1, 1, 10).unwrap_err();
        assert_eq!(err.code, "invalid_parameter");
        assert!(err.error.contains("count"));
        assert!(bounded("count", Some(11), 1, 1, 10).is_err());
    }

    #[test]
    fn test_error_codes() {
        let not_found = ScenarioErrorResponse::from(ScenarioApiError::NotFound("x".into()));
        assert_eq!(not_found.code, "not_found");
        assert_eq!(
            not_found.into_response().status(),
            StatusCode::NOT_FOUND
        );

        let conflict = ScenarioErrorResponse::from(ScenarioApiError::Conflict("x".into()));
        assert_eq!(conflict.code, "conflict");
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);
    }
}
