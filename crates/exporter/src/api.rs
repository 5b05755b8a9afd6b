//! HTTP API for health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use exporter_lib::health::{ComponentStatus, HealthRegistry};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub registry: Registry,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, registry: Registry) -> Self {
        Self {
            health_registry,
            registry,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the first round completed
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting metrics server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use exporter_lib::health::components;
    use exporter_lib::ExporterMetrics;
    use tower::ServiceExt;

    async fn setup_test_app() -> (Router, Arc<AppState>, ExporterMetrics) {
        let health_registry = HealthRegistry::new();
        health_registry.register(components::PIPELINE).await;
        health_registry.register(components::KUBE_RESOURCES).await;

        let registry = Registry::new();
        let metrics = ExporterMetrics::new(&registry).unwrap();
        let state = Arc::new(AppState::new(health_registry, registry));
        let router = create_router(state.clone());

        (router, state, metrics)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_healthy() {
        let (app, _state, _metrics) = setup_test_app().await;

        let (status, body) = get_body(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);

        let health: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["status"], "healthy");
        assert!(health["components"]["pipeline"].is_object());
        assert!(health["components"]["kube_resources"].is_object());
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_refresh_degraded() {
        let (app, state, _metrics) = setup_test_app().await;
        state
            .health_registry
            .set_degraded(components::KUBE_RESOURCES, "kubelet socket missing")
            .await;

        let (status, body) = get_body(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);

        let health: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["status"], "degraded");
    }

    #[tokio::test]
    async fn test_unreadable_devices_fail_health_and_readiness() {
        let (app, state, _metrics) = setup_test_app().await;
        state.health_registry.set_ready(true).await;
        state
            .health_registry
            .set_unhealthy(components::PIPELINE, "device listing failed 3 rounds in a row")
            .await;

        let (status, body) = get_body(app.clone(), "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let health: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["status"], "unhealthy");

        let (status, body) = get_body(app, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let readiness: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            readiness["reason"],
            "pipeline unhealthy: device listing failed 3 rounds in a row"
        );
    }

    #[tokio::test]
    async fn test_readyz_follows_first_round() {
        let (app, state, _metrics) = setup_test_app().await;

        let (status, body) = get_body(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let readiness: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(readiness["ready"], false);

        state.health_registry.set_ready(true).await;

        let (status, _body) = get_body(app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_renders_owned_registry() {
        let (app, _state, metrics) = setup_test_app().await;
        metrics.observe_round_latency(0.01);
        metrics.set_devices_monitored(4);

        let (status, body) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);

        assert!(body.contains("furiosa_exporter_round_latency_seconds_bucket"));
        assert!(body.contains("furiosa_exporter_devices_monitored 4"));
    }
}
