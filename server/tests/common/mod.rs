//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
    routing::get,
};
use bytes::Bytes;
use faultlab_server::config::{CacheConfig, Config, LockOrderConfig, RetryConfig};
use faultlab_server::health::health;
use faultlab_server::scenario::{Dependency, DependencyError};
use faultlab_server::{ScenarioAppState, ScenarioCoordinator, scenario_routes};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;
use tower_http::cors::{Any, CorsLayer};

/// Dependency that answers every call immediately
pub struct HealthyDependency;

#[async_trait]
impl Dependency for HealthyDependency {
    async fn call(&self, resource_id: &str) -> Result<Bytes, DependencyError> {
        Ok(Bytes::from(format!("data:{}", resource_id)))
    }
}

/// Dependency that never answers
pub struct HungDependency;

#[async_trait]
impl Dependency for HungDependency {
    async fn call(&self, _resource_id: &str) -> Result<Bytes, DependencyError> {
        std::future::pending().await
    }
}

/// Configuration with small payloads and short timeouts so tests run fast
pub fn test_config() -> Config {
    Config {
        cache: CacheConfig {
            payload_bytes: 4096,
            processing_delay: Duration::ZERO,
            ..CacheConfig::default()
        },
        lock_order: LockOrderConfig {
            delay_min: Duration::from_millis(1),
            delay_max: Duration::from_millis(2),
            detection_timeout: Duration::from_millis(500),
            initial_inventory: 100,
        },
        retry: RetryConfig {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_millis(30),
            backoff_unit: Duration::from_millis(5),
        },
        ..Config::default()
    }
}

/// Create a test application router around the given dependency
pub fn create_test_app_with_dependency(
    config: &Config,
    dependency: Arc<dyn Dependency>,
) -> (Router, Arc<ScenarioCoordinator>) {
    let coordinator = Arc::new(ScenarioCoordinator::with_dependency(config, dependency));
    let state = ScenarioAppState {
        coordinator: coordinator.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/api", scenario_routes(state))
        .layer(cors);

    (app, coordinator)
}

/// Create a test application router with a healthy dependency
pub fn create_test_app() -> (Router, Arc<ScenarioCoordinator>) {
    create_test_app_with_dependency(&test_config(), Arc::new(HealthyDependency))
}

/// Send a request with an empty body
pub async fn send(app: &Router, method: &str, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Send a request with a JSON body
pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Read a response body as JSON
pub async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
