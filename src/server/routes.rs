use crate::healing::types::success_rate;
use crate::healing::{ErrorReport, ErrorSignature};
use crate::server::AppState;
use crate::server::adapter::{AppError, tenant_from_request};
use crate::server::taxonomy::ErrorKind;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::info;

/// Body of a generic failure report.
#[derive(Debug, Deserialize)]
pub struct IntakeRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

/// Body of a dedicated integration failure report; the type comes from the route.
#[derive(Debug, Deserialize)]
pub struct FailureRequest {
    pub message: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "in_flight": state.orchestrator.in_flight().len(),
    }))
}

/// `POST /api/errors`: tenant from the body, header, or bearer claims.
pub async fn report_error(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IntakeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tenant_id = body
        .tenant_id
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| tenant_from_request(&headers, ""))
        .ok_or_else(|| AppError::validation("tenant id is required"))?;
    Ok(accept(&state, intake_report(tenant_id, body)?))
}

/// `POST /api/tenant/:tenant_id/errors`
pub async fn report_tenant_error(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<IntakeRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(accept(&state, intake_report(tenant_id, body)?))
}

/// `POST /api/tenant/:tenant_id/failures/:kind`
pub async fn report_failure(
    State(state): State<AppState>,
    Path((tenant_id, kind)): Path<(String, String)>,
    Json(body): Json<FailureRequest>,
) -> Result<impl IntoResponse, AppError> {
    let kind = match kind.as_str() {
        "database" => ErrorKind::DataStoreConnection,
        "authentication" => ErrorKind::Authentication,
        "validation" => ErrorKind::Validation,
        "upload" => ErrorKind::DocumentUpload,
        other => return Err(AppError::not_found(format!("unknown failure kind '{}'", other))),
    };
    Ok(accept(&state, failure_report(tenant_id, kind, body)))
}

/// `POST /api/tenant/:tenant_id/failures/integration/:name`
pub async fn report_integration_failure(
    State(state): State<AppState>,
    Path((tenant_id, name)): Path<(String, String)>,
    Json(body): Json<FailureRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(AppError::validation("integration name is required"));
    }
    Ok(accept(&state, failure_report(tenant_id, ErrorKind::ExternalIntegration(name), body)))
}

/// `GET /api/tenant/:tenant_id/healing/:error_type`
pub async fn healing_history(
    State(state): State<AppState>,
    Path((tenant_id, error_type)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = state
        .orchestrator
        .store()
        .get_healing_history(&tenant_id, &error_type)
        .await
        .map_err(|e| AppError::from(e).with_context("history_error_type", json!(error_type)))?;
    let signature = ErrorSignature::new(tenant_id.clone(), error_type.clone());

    Ok(Json(json!({
        "tenant_id": tenant_id,
        "error_type": error_type,
        "success_rate": success_rate(&attempts),
        "in_flight": state.orchestrator.in_flight().contains(&signature),
        "attempts": attempts,
    })))
}

/// `GET /api/healing/in-flight`
pub async fn in_flight(State(state): State<AppState>) -> impl IntoResponse {
    let signatures = state.orchestrator.in_flight().snapshot();
    Json(json!({
        "count": signatures.len(),
        "signatures": signatures,
    }))
}

fn intake_report(tenant_id: String, body: IntakeRequest) -> Result<ErrorReport, AppError> {
    if body.error_type.trim().is_empty() {
        return Err(AppError::validation("error_type is required"));
    }
    Ok(ErrorReport {
        tenant_id,
        error_type: body.error_type,
        message: body.message,
        stack_trace: body.stack_trace,
        user_id: body.user_id,
        endpoint: body.endpoint,
        context: body.context,
    })
}

fn failure_report(tenant_id: String, kind: ErrorKind, body: FailureRequest) -> ErrorReport {
    ErrorReport {
        tenant_id,
        error_type: kind.tag(),
        message: body.message,
        stack_trace: body.stack_trace,
        user_id: body.user_id,
        endpoint: body.endpoint,
        context: body.context,
    }
}

fn accept(state: &AppState, report: ErrorReport) -> (StatusCode, Json<Value>) {
    let signature = report.signature();
    info!(signature = %signature, "Failure report accepted");
    drop(state.orchestrator.spawn(report));

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "accepted": true,
            "signature": signature.to_string(),
        })),
    )
}
