//! Plan Generator - asks the inference provider for a remediation plan
//!
//! Generation never fails outward: provider errors, timeouts and
//! unparseable replies all degrade to an ESCALATE plan with zero confidence.

use crate::error::{HealerError, Result};
use crate::healing::types::{ActionPayload, ErrorEvent, RemediationAction, RemediationPlan, RetrySpec};
use crate::providers::{CompletionRequest, Message, Provider};
use crate::retry::retry_with_backoff;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = r#"You are the remediation planner for a multi-tenant freight operations platform (loads, drivers, trailers, customers, payroll, banking).
Given one production error, propose a single corrective action. Reply with ONE JSON object and nothing else:
{
  "action": one of "DATA_FIX" | "CONFIG_UPDATE" | "API_RETRY" | "CACHE_CLEAR" | "SESSION_RESET" | "NOTIFICATION_RESEND" | "SYNC_REPAIR" | "PAYMENT_RETRY" | "ESCALATE",
  "description": "what the action does and why, one or two sentences",
  "mutation": "SQL for DATA_FIX only, scoped to the tenant with a precise WHERE clause",
  "config_patch": { "key": "value" } for CONFIG_UPDATE only,
  "retry": { "max_attempts": 3, "backoff_ms": 500, "reference": "optional id" } for API_RETRY and PAYMENT_RETRY only,
  "rollback": "how to undo the action, or null",
  "confidence": number between 0 and 1,
  "estimated_minutes": integer
}
Never propose dropping, truncating, or bulk-modifying tables. If you are unsure, use ESCALATE with low confidence."#;

/// Produces a remediation plan for an error. Infallible by contract.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, event: &ErrorEvent) -> RemediationPlan;
}

pub struct AiPlanGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl AiPlanGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout,
            max_retries,
        }
    }

    /// The structured error description sent to the model.
    pub fn request_payload(event: &ErrorEvent) -> serde_json::Value {
        serde_json::json!({
            "tenant_id": event.tenant_id,
            "error_type": event.error_type,
            "message": event.message,
            "severity": event.severity,
            "endpoint": event.endpoint,
            "context": event.context,
        })
    }

    fn build_request(&self, event: &ErrorEvent) -> Result<CompletionRequest> {
        let payload = serde_json::to_string_pretty(&Self::request_payload(event))?;

        Ok(CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(format!("Error report:\n{}", payload)),
            ],
            temperature: Some(0.1),
            max_tokens: Some(800),
            json_mode: true,
        })
    }

    async fn try_generate(&self, event: &ErrorEvent) -> Result<RemediationPlan> {
        let request = self.build_request(event)?;

        let response = retry_with_backoff(self.max_retries, Duration::from_millis(500), || {
            let provider = self.provider.clone();
            let request = request.clone();
            async move { provider.complete(request).await }
        })
        .await?;

        debug!(
            response_id = %response.id,
            finish_reason = ?response.finish_reason,
            "Plan generator replied"
        );

        parse_plan(&response.content)
    }
}

#[async_trait]
impl PlanGenerator for AiPlanGenerator {
    async fn generate(&self, event: &ErrorEvent) -> RemediationPlan {
        let started = Instant::now();

        match tokio::time::timeout(self.timeout, self.try_generate(event)).await {
            Ok(Ok(plan)) => {
                info!(
                    signature = %event.signature(),
                    action = %plan.action,
                    confidence = plan.confidence(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Remediation plan generated"
                );
                plan
            }
            Ok(Err(e)) => {
                warn!(signature = %event.signature(), error = %e, "Plan generation failed");
                RemediationPlan::escalation(format!("Automatic plan generation failed: {}", e))
            }
            Err(_) => {
                let err = HealerError::timeout("plan generation", self.timeout.as_secs());
                warn!(signature = %event.signature(), error = %err, "Plan generation timed out");
                RemediationPlan::escalation(format!("Automatic plan generation failed: {}", err))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    action: RemediationAction,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "sql_fix", alias = "sql")]
    mutation: Option<String>,
    #[serde(default, alias = "config_changes")]
    config_patch: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, alias = "retry_strategy")]
    retry: Option<RetrySpec>,
    #[serde(default, alias = "rollback_plan")]
    rollback: Option<String>,
    confidence: f64,
    #[serde(default, alias = "estimated_time")]
    estimated_minutes: Option<f64>,
}

impl RawPlan {
    fn into_plan(self) -> RemediationPlan {
        let description = if self.description.trim().is_empty() {
            format!("{} remediation", self.action)
        } else {
            self.description.trim().to_string()
        };

        // Only the payload matching the action is kept.
        let payload = match self.action {
            RemediationAction::DataFix => self
                .mutation
                .filter(|m| !m.trim().is_empty())
                .map(ActionPayload::Mutation),
            RemediationAction::ConfigUpdate => self.config_patch.map(ActionPayload::ConfigPatch),
            RemediationAction::ApiRetry | RemediationAction::PaymentRetry => {
                self.retry.map(ActionPayload::Retry)
            }
            _ => None,
        };

        let mut plan = RemediationPlan::new(self.action, description, self.confidence)
            .with_estimated_minutes(
                self.estimated_minutes
                    .filter(|m| m.is_finite() && *m >= 0.0)
                    .map(|m| m.round() as u32)
                    .unwrap_or(0),
            );
        plan.payload = payload;
        plan.rollback = self.rollback.filter(|r| !r.trim().is_empty());
        plan
    }
}

/// Parse a model reply into a plan. Tolerates code fences and prose around
/// the JSON object.
pub fn parse_plan(content: &str) -> Result<RemediationPlan> {
    let json = extract_json_object(content)
        .ok_or_else(|| HealerError::PlanParse("no JSON object in response".to_string()))?;

    let raw: RawPlan = serde_json::from_str(json)
        .map_err(|e| HealerError::PlanParse(e.to_string()))?;

    if !raw.confidence.is_finite() {
        return Err(HealerError::PlanParse("confidence is not a number".to_string()));
    }

    Ok(raw.into_plan())
}

fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}
