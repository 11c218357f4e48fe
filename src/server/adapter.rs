//! Failure adapter for the serving layer.
//!
//! Handlers return [`AppError`]. Its `IntoResponse` produces a sanitized
//! response and stashes the error in the response extensions; the
//! [`failure_middleware`] then re-renders it for the configured mode, works
//! out the tenant, and hands healable failures to the orchestrator on a
//! detached task. The response never waits on healing.

use crate::healing::ErrorReport;
use crate::server::AppState;
use crate::server::taxonomy::ErrorKind;
use axum::Json;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

pub const TENANT_HEADER: &str = "x-tenant-id";

/// A failure raised by a request handler.
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub stack: Option<String>,
    pub context: HashMap<String, Value>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
            context: HashMap::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Typed response body. Internal detail is only exposed outside production.
    pub fn render(&self, production: bool) -> Response {
        let status = self.kind.status();
        let mut body = json!({
            "error": {
                "type": self.kind.tag(),
                "message": self.kind.user_message(),
                "status": status.as_u16(),
            }
        });

        if !production {
            body["error"]["detail"] = json!(self.message);
            if let Some(stack) = &self.stack {
                body["error"]["stack"] = json!(stack);
            }
        }

        (status, Json(body)).into_response()
    }

    fn into_report(self, tenant_id: String, user_id: Option<String>, method: &Method, path: &str) -> ErrorReport {
        let mut report = ErrorReport::new(tenant_id, self.kind.tag(), self.message)
            .with_endpoint(format!("{} {}", method, path))
            .with_context("http_method", json!(method.as_str()))
            .with_context("path", json!(path));
        report.context.extend(self.context);
        if let Some(stack) = self.stack {
            report = report.with_stack_trace(stack);
        }
        if let Some(user_id) = user_id {
            report = report.with_user(user_id);
        }
        report
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = self.render(true);
        response.extensions_mut().insert(self);
        response
    }
}

impl From<crate::error::HealerError> for AppError {
    fn from(err: crate::error::HealerError) -> Self {
        use crate::error::HealerError;
        let kind = match &err {
            HealerError::Store(_) => ErrorKind::DataStoreConnection,
            HealerError::Timeout { .. } => ErrorKind::Timeout,
            HealerError::Configuration(_) => ErrorKind::Configuration,
            HealerError::Authentication(_) => ErrorKind::Authentication,
            HealerError::Json(_) => ErrorKind::Validation,
            _ => ErrorKind::Unknown,
        };
        AppError::new(kind, err.to_string())
    }
}

/// Mount the failure adapter on an application router.
pub fn with_failure_adapter(router: Router, state: AppState) -> Router {
    router.layer(middleware::from_fn_with_state(state, failure_middleware))
}

pub async fn failure_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let tenant = tenant_from_request(request.headers(), &path);
    let user = user_from_headers(request.headers());

    let mut response = next.run(request).await;

    if let Some(error) = response.extensions_mut().remove::<AppError>() {
        response = error.render(state.production);

        match tenant.clone() {
            Some(tenant_id) if error.kind.routes_to_healing() => {
                debug!(tenant = %tenant_id, error_type = %error.kind, "Routing failure to healing");
                let report = error.into_report(tenant_id, user, &method, &path);
                drop(state.orchestrator.spawn(report));
            }
            Some(_) => debug!(error_type = %error.kind, "Failure kind is not routed to healing"),
            None => debug!(error_type = %error.kind, %path, "No tenant for failure, skipping healing"),
        }
    }

    let elapsed = started.elapsed();
    if elapsed > state.slow_request {
        warn!(
            error_type = %ErrorKind::Performance,
            tenant = tenant.as_deref().unwrap_or("-"),
            %method,
            %path,
            elapsed_ms = elapsed.as_millis() as u64,
            threshold_ms = state.slow_request.as_millis() as u64,
            "Slow response"
        );
    }

    response
}

/// Renders handler errors for the configured mode without routing them to
/// healing. Used on the healer's own endpoints, where a failure is the
/// caller's bad input rather than a tenant incident.
pub async fn render_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    match response.extensions_mut().remove::<AppError>() {
        Some(error) => error.render(state.production),
        None => response,
    }
}

/// Tenant from the `x-tenant-id` header, then bearer token claims, then the
/// `/api/tenant/{id}/...` path convention.
pub fn tenant_from_request(headers: &HeaderMap, path: &str) -> Option<String> {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| {
            let claims = bearer_claims(headers)?;
            claims
                .get("tenant_id")
                .or_else(|| claims.get("tenantId"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .or_else(|| tenant_from_path(path))
}

pub fn tenant_from_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/api/tenant/")?;
    let tenant = rest.split('/').next()?;
    if tenant.is_empty() {
        return None;
    }
    urlencoding::decode(tenant).ok().map(|t| t.into_owned())
}

fn user_from_headers(headers: &HeaderMap) -> Option<String> {
    let claims = bearer_claims(headers)?;
    claims
        .get("sub")
        .or_else(|| claims.get("user_id"))
        .and_then(Value::as_str)
        .map(String::from)
}

/// Payload claims of a JWT bearer token. The signature is not checked; the
/// claims only attribute the failure.
fn bearer_claims(headers: &HeaderMap) -> Option<Map<String, Value>> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?;
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(claims) => Some(claims),
        _ => None,
    }
}
