//! Integration tests for the health and metrics endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use quarantine_lib::{
    api::{create_router, AppState},
    health::{components, HealthRegistry},
    observability::ControllerMetrics,
    NodeUtilization,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app(health_registry: HealthRegistry) -> (Router, Arc<AppState>) {
    health_registry.register(components::EVALUATOR).await;
    health_registry.register(components::CLUSTER_API).await;

    let state = Arc::new(AppState::new(health_registry, ControllerMetrics::new()));
    (create_router(state.clone()), state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_healthz_ok_when_healthy() {
    let (app, _state) = setup_test_app(HealthRegistry::new()).await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["evaluator"].is_object());
}

#[tokio::test]
async fn test_healthz_ok_when_cluster_api_degraded() {
    let (app, state) = setup_test_app(HealthRegistry::new()).await;
    state
        .health_registry
        .set_degraded(components::CLUSTER_API, "list nodes timed out")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["cluster_api"]["message"],
        "list nodes timed out"
    );
}

#[tokio::test]
async fn test_healthz_unavailable_when_cycles_stall() {
    let registry = HealthRegistry::new().with_stale_after(Duration::seconds(60));
    let (app, state) = setup_test_app(registry).await;
    state
        .health_registry
        .record_cycle(Utc::now() - Duration::seconds(600))
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_before_and_after_first_cycle() {
    let (app, state) = setup_test_app(HealthRegistry::new()).await;

    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);

    state.health_registry.record_cycle(Utc::now()).await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_controller_metrics() {
    let (app, state) = setup_test_app(HealthRegistry::new()).await;
    state.metrics.observe_evaluation_latency(0.05);
    state.metrics.set_tracked(2, 1);
    state
        .metrics
        .set_utilizations(&[NodeUtilization::new("worker-1", 0.12)]);

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("node_quarantine_evaluation_latency_seconds"));
    assert!(text.contains("node_quarantine_tracked_nodes 2"));
    assert!(text.contains("node_quarantine_eligible_nodes 1"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (app, _state) = setup_test_app(HealthRegistry::new()).await;
    let (status, _) = get(app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
