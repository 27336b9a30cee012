use axum::{Router, response::IntoResponse, routing::get};
use faultlab_server::config::Config;
use faultlab_server::health;
use faultlab_server::{ScenarioAppState, ScenarioCoordinator, scenario_routes};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus metrics handle for exposing metrics in Prometheus format
static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Initialize the Prometheus metrics recorder
fn setup_prometheus_metrics() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Endpoint to expose metrics in Prometheus format
async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Update gauge metrics from the scenario counters (called periodically)
async fn update_gauge_metrics(coordinator: &ScenarioCoordinator) {
    let stats = coordinator.snapshot().await;

    metrics::gauge!("faultlab_cache_entries").set(stats.cache_entries as f64);
    metrics::gauge!("faultlab_cache_bytes").set(stats.cache_bytes as f64);
    metrics::gauge!("faultlab_successful_orders").set(stats.successful_orders as f64);
    metrics::gauge!("faultlab_deadlock_detections").set(stats.deadlock_detections as f64);
    metrics::gauge!("faultlab_abandoned_workers").set(stats.abandoned_workers as f64);
    metrics::gauge!("faultlab_pending_calls").set(stats.pending_calls as f64);
    metrics::gauge!("faultlab_failed_calls").set(stats.failed_calls as f64);
    metrics::gauge!("faultlab_timed_out_calls").set(stats.timed_out_calls as f64);

    metrics::gauge!("faultlab_uptime_seconds").set(health::uptime_seconds() as f64);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Record server start time
    health::mark_started();

    // Initialize Prometheus metrics recorder (must be done before any metrics are recorded)
    let prometheus_handle = setup_prometheus_metrics()?;
    PROMETHEUS_HANDLE.set(prometheus_handle).ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "faultlab=debug,faultlab_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: host={}, port={}",
        config.host, config.port
    );
    info!(
        "Retry policy: {} attempts, {:?} per attempt, {:?} error backoff unit",
        config.retry.max_attempts, config.retry.per_attempt_timeout, config.retry.backoff_unit
    );

    let coordinator = Arc::new(ScenarioCoordinator::new(&config));
    let scenario_state = ScenarioAppState {
        coordinator: coordinator.clone(),
    };

    // Periodic cache growth, if enabled
    if config.cache.periodic_enabled {
        info!(
            "Periodic memory leak enabled: one insert every {:?}",
            config.cache.periodic_interval
        );
        let cache = coordinator.cache().clone();
        let period = config.cache.periodic_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                cache.insert("periodic", None).await;
            }
        });
    } else {
        info!("Periodic memory leak disabled (CACHE_LEAK_ENABLED not set)");
    }

    // Periodic update of gauge metrics (every 5 seconds)
    let metrics_coordinator = coordinator.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            update_gauge_metrics(&metrics_coordinator).await;
        }
    });

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .with_state(scenario_state.clone())
        .merge(Router::new().nest("/api", scenario_routes(scenario_state)))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("FaultLab server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
