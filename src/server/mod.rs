//! HTTP surface of the healer
//!
//! Failure intake endpoints, healing history and in-flight views, and the
//! failure adapter middleware that turns application handler errors into
//! typed responses and background healing runs. Intake endpoints only render
//! their errors; a rejected report never feeds back into healing.

use crate::error::{HealerError, Result};
use crate::healing::HealingOrchestrator;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod adapter;
pub mod routes;
pub mod taxonomy;

pub use adapter::with_failure_adapter;
pub use taxonomy::ErrorKind;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<HealingOrchestrator>,
    /// Hide internal detail and stack traces from responses.
    pub production: bool,
    pub slow_request: Duration,
}

impl AppState {
    pub fn new(orchestrator: Arc<HealingOrchestrator>, production: bool, slow_request: Duration) -> Self {
        Self {
            orchestrator,
            production,
            slow_request,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let intake = Router::new()
        .route("/health", get(routes::health))
        .route("/api/errors", post(routes::report_error))
        .route("/api/tenant/:tenant_id/errors", post(routes::report_tenant_error))
        .route("/api/tenant/:tenant_id/failures/:kind", post(routes::report_failure))
        .route(
            "/api/tenant/:tenant_id/failures/integration/:name",
            post(routes::report_integration_failure),
        )
        .layer(middleware::from_fn_with_state(state.clone(), adapter::render_middleware))
        .with_state(state.clone());

    // Store failures behind the views are platform incidents like any other.
    let views = Router::new()
        .route("/api/tenant/:tenant_id/healing/:error_type", get(routes::healing_history))
        .route("/api/healing/in-flight", get(routes::in_flight))
        .with_state(state.clone());

    intake.merge(with_failure_adapter(views, state))
}

pub async fn serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .map_err(|e| HealerError::Configuration(format!("Invalid address {}:{}: {}", bind, port, e)))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, production = state.production, "Healer listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Healer stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received shutdown signal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealingConfig;
    use crate::healing::testing::{FakeGenerator, Outbox, StaticReplayer};
    use crate::server::adapter::AppError;
    use crate::healing::types::{HealingAttempt, RemediationAction, RemediationPlan, Severity};
    use crate::services::{Collaborators, HealingStore, InMemoryBackend};
    use axum::body::{Body, to_bytes};
    use axum::extract::Path;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct Harness {
        backend: Arc<InMemoryBackend>,
        generator: Arc<FakeGenerator>,
        state: AppState,
    }

    fn harness(production: bool) -> Harness {
        let backend = Arc::new(InMemoryBackend::new());
        let services = Collaborators::in_memory(
            backend.clone(),
            Arc::new(Outbox::default()),
            Arc::new(StaticReplayer::new(vec![])),
        );
        let generator = Arc::new(FakeGenerator::new(RemediationPlan::new(
            RemediationAction::CacheClear,
            "flush tenant cache",
            0.9,
        )));
        let orchestrator = Arc::new(HealingOrchestrator::new(
            &HealingConfig::default(),
            generator.clone(),
            &services,
        ));
        Harness {
            backend,
            generator,
            state: AppState::new(orchestrator, production, Duration::from_secs(5)),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        serde_json::from_slice(&bytes).expect("parse json")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request")
    }

    async fn wait_for_error_logs(backend: &InMemoryBackend, expected: usize) {
        for _ in 0..100 {
            if backend.error_logs().await.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("healing never logged {expected} error(s)");
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(true);
        let response = router(h.state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_tenant_intake_is_accepted_and_healed() {
        let h = harness(true);
        let response = router(h.state.clone())
            .oneshot(post_json(
                "/api/tenant/T1/errors",
                json!({ "error_type": "DataStoreConnectionError", "message": "connection refused" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["signature"], "T1:DataStoreConnectionError");

        wait_for_error_logs(&h.backend, 1).await;
        assert_eq!(h.backend.error_logs().await[0].tenant_id, "T1");
    }

    #[tokio::test]
    async fn test_generic_intake_requires_tenant() {
        let h = harness(true);
        let response = router(h.state.clone())
            .oneshot(post_json(
                "/api/errors",
                json!({ "error_type": "SyncError", "message": "sync failed" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["type"], "ValidationError");

        let mut request = post_json("/api/errors", json!({ "error_type": "SyncError", "message": "sync failed" }));
        request.headers_mut().insert("x-tenant-id", "T7".parse().unwrap());
        let response = router(h.state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["signature"], "T7:SyncError");
    }

    #[tokio::test]
    async fn test_rejected_report_does_not_start_healing() {
        let h = harness(false);
        let response = router(h.state)
            .oneshot(post_json(
                "/api/tenant/T1/errors",
                json!({ "error_type": "", "message": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["detail"], "error_type is required");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.backend.error_logs().await.is_empty());
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_integration_failure_uses_canonical_tag() {
        let h = harness(true);
        let response = router(h.state)
            .oneshot(post_json(
                "/api/tenant/T1/failures/integration/Samsara",
                json!({ "message": "eld feed timed out" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            json_body(response).await["signature"],
            "T1:ExternalIntegrationError:samsara"
        );
    }

    #[tokio::test]
    async fn test_unknown_failure_kind_is_not_healed() {
        let h = harness(true);
        let response = router(h.state)
            .oneshot(post_json("/api/tenant/T1/failures/plumbing", json!({ "message": "?" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], ErrorKind::NotFound.user_message());
        assert!(body["error"].get("detail").is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.backend.error_logs().await.is_empty());
    }

    async fn failing_load_lookup(Path(_tenant): Path<String>) -> std::result::Result<String, AppError> {
        Err(AppError::new(ErrorKind::DataStoreConnection, "pool exhausted after 30s")
            .with_stack("at loads::lookup (loads.rs:42)"))
    }

    fn app_router(state: AppState) -> Router {
        let app = Router::new().route("/api/tenant/:tenant_id/loads", get(failing_load_lookup));
        with_failure_adapter(app, state)
    }

    #[tokio::test]
    async fn test_adapter_sanitizes_and_spawns_healing() {
        let h = harness(true);
        let response = app_router(h.state.clone())
            .oneshot(Request::builder().uri("/api/tenant/T3/loads").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "DataStoreConnectionError");
        assert!(body["error"].get("stack").is_none());
        assert!(!body.to_string().contains("pool exhausted"));

        wait_for_error_logs(&h.backend, 1).await;
        let logged = &h.backend.error_logs().await[0];
        assert_eq!(logged.tenant_id, "T3");
        assert_eq!(logged.endpoint.as_deref(), Some("GET /api/tenant/T3/loads"));
        assert!(logged.stack_trace.is_some());
    }

    #[tokio::test]
    async fn test_adapter_exposes_detail_outside_production() {
        let h = harness(false);
        let response = app_router(h.state)
            .oneshot(Request::builder().uri("/api/tenant/T3/loads").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["error"]["detail"], "pool exhausted after 30s");
        assert_eq!(body["error"]["stack"], "at loads::lookup (loads.rs:42)");
    }

    #[tokio::test]
    async fn test_history_and_in_flight_views() {
        let h = harness(true);
        let event = crate::healing::ErrorEvent::from_report(
            crate::healing::ErrorReport::new("T1", "SyncError", "sync failed"),
            Severity::Low,
        );
        let plan = RemediationPlan::new(RemediationAction::SyncRepair, "resync", 0.9);
        for success in [true, true, false, true] {
            h.backend
                .create_healing_record(&HealingAttempt::record(&event, &plan, success))
                .await
                .unwrap();
        }

        let response = router(h.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/tenant/T1/healing/SyncError")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success_rate"], 0.75);
        assert_eq!(body["attempts"].as_array().unwrap().len(), 4);

        let _guard = h
            .state
            .orchestrator
            .in_flight()
            .try_acquire(crate::healing::ErrorSignature::new("T2", "TimeoutError"))
            .unwrap();
        let response = router(h.state)
            .oneshot(Request::builder().uri("/api/healing/in-flight").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["signatures"][0]["tenant_id"], "T2");
    }
}
