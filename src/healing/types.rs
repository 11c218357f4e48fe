//! Data model shared by the classifier, planner, validator and executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Severity levels for error events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Deduplication and history key: one tenant, one error type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ErrorSignature {
    pub tenant_id: String,
    pub error_type: String,
}

impl ErrorSignature {
    pub fn new(tenant_id: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            error_type: error_type.into(),
        }
    }
}

impl fmt::Display for ErrorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant_id, self.error_type)
    }
}

/// What the serving layer hands to the orchestrator for one failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorReport {
    pub tenant_id: String,
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl ErrorReport {
    pub fn new(
        tenant_id: impl Into<String>,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            error_type: error_type.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn signature(&self) -> ErrorSignature {
        ErrorSignature::new(self.tenant_id.clone(), self.error_type.clone())
    }
}

/// A single failure occurrence, as logged to the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub id: Uuid,
    pub tenant_id: String,
    pub error_type: String,
    pub message: String,
    pub stack_trace: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub endpoint: Option<String>,
    pub severity: Severity,
    pub context: HashMap<String, serde_json::Value>,
}

impl ErrorEvent {
    pub fn from_report(report: ErrorReport, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: report.tenant_id,
            error_type: report.error_type,
            message: report.message,
            stack_trace: report.stack_trace,
            timestamp: Utc::now(),
            user_id: report.user_id,
            endpoint: report.endpoint,
            severity,
            context: report.context,
        }
    }

    pub fn signature(&self) -> ErrorSignature {
        ErrorSignature::new(self.tenant_id.clone(), self.error_type.clone())
    }

    /// Stable hash of type and message with digits masked, so the same fault
    /// with different ids or counts groups together in the audit log.
    pub fn fingerprint(&self) -> String {
        let mut normalized = String::with_capacity(self.message.len());
        for c in self.message.chars() {
            if c.is_ascii_digit() {
                if !normalized.ends_with('#') {
                    normalized.push('#');
                }
            } else {
                normalized.push(c.to_ascii_lowercase());
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(self.error_type.as_bytes());
        hasher.update(b"\n");
        hasher.update(normalized.as_bytes());
        hasher
            .finalize()
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(|v| v.as_str())
    }
}

/// The remediation action kinds a plan may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemediationAction {
    DataFix,
    ConfigUpdate,
    ApiRetry,
    CacheClear,
    SessionReset,
    NotificationResend,
    SyncRepair,
    PaymentRetry,
    Escalate,
}

impl RemediationAction {
    pub const ALL: [RemediationAction; 9] = [
        RemediationAction::DataFix,
        RemediationAction::ConfigUpdate,
        RemediationAction::ApiRetry,
        RemediationAction::CacheClear,
        RemediationAction::SessionReset,
        RemediationAction::NotificationResend,
        RemediationAction::SyncRepair,
        RemediationAction::PaymentRetry,
        RemediationAction::Escalate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationAction::DataFix => "DATA_FIX",
            RemediationAction::ConfigUpdate => "CONFIG_UPDATE",
            RemediationAction::ApiRetry => "API_RETRY",
            RemediationAction::CacheClear => "CACHE_CLEAR",
            RemediationAction::SessionReset => "SESSION_RESET",
            RemediationAction::NotificationResend => "NOTIFICATION_RESEND",
            RemediationAction::SyncRepair => "SYNC_REPAIR",
            RemediationAction::PaymentRetry => "PAYMENT_RETRY",
            RemediationAction::Escalate => "ESCALATE",
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an API or payment retry should be paced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySpec {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub reference: Option<String>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            reference: None,
        }
    }
}

/// Action-specific data carried by a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActionPayload {
    Mutation(String),
    ConfigPatch(serde_json::Map<String, serde_json::Value>),
    Retry(RetrySpec),
}

/// A machine-generated corrective action and how sure the generator is.
///
/// Confidence is clamped to [0, 1] on construction and can only go down
/// afterwards: [`RemediationPlan::veto`] pins it to zero for good.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemediationPlan {
    pub action: RemediationAction,
    pub description: String,
    pub payload: Option<ActionPayload>,
    pub rollback: Option<String>,
    pub estimated_minutes: u32,
    confidence: f64,
    veto_reason: Option<String>,
}

impl RemediationPlan {
    pub fn new(action: RemediationAction, description: impl Into<String>, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            action,
            description: description.into(),
            payload: None,
            rollback: None,
            estimated_minutes: 0,
            confidence,
            veto_reason: None,
        }
    }

    /// The plan every failure path degrades to.
    pub fn escalation(reason: impl Into<String>) -> Self {
        Self::new(RemediationAction::Escalate, reason, 0.0)
    }

    pub fn with_payload(mut self, payload: ActionPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_rollback(mut self, rollback: impl Into<String>) -> Self {
        self.rollback = Some(rollback.into());
        self
    }

    pub fn with_estimated_minutes(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes;
        self
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn veto(&mut self, reason: impl Into<String>) {
        self.confidence = 0.0;
        self.veto_reason = Some(reason.into());
    }

    pub fn is_vetoed(&self) -> bool {
        self.veto_reason.is_some()
    }

    pub fn veto_reason(&self) -> Option<&str> {
        self.veto_reason.as_deref()
    }

    pub fn mutation(&self) -> Option<&str> {
        match &self.payload {
            Some(ActionPayload::Mutation(sql)) => Some(sql.as_str()),
            _ => None,
        }
    }

    pub fn config_patch(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match &self.payload {
            Some(ActionPayload::ConfigPatch(patch)) => Some(patch),
            _ => None,
        }
    }

    pub fn retry_spec(&self) -> Option<&RetrySpec> {
        match &self.payload {
            Some(ActionPayload::Retry(spec)) => Some(spec),
            _ => None,
        }
    }
}

/// Persisted outcome of one executed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingAttempt {
    pub id: Uuid,
    pub tenant_id: String,
    pub error_type: String,
    pub action: RemediationAction,
    pub success: bool,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl HealingAttempt {
    pub fn record(event: &ErrorEvent, plan: &RemediationPlan, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: event.tenant_id.clone(),
            error_type: event.error_type.clone(),
            action: plan.action,
            success,
            confidence: plan.confidence(),
            timestamp: Utc::now(),
        }
    }
}

/// Fraction of successful attempts, or `None` when there is no history.
pub fn success_rate(history: &[HealingAttempt]) -> Option<f64> {
    if history.is_empty() {
        return None;
    }
    let successes = history.iter().filter(|a| a.success).count();
    Some(successes as f64 / history.len() as f64)
}

/// A tenant administrator who receives post-healing summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

/// An outbound notification the platform failed to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedNotification {
    pub id: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub attempts: u32,
}
