//! Action Executor - one handler per remediation action kind
//!
//! Handlers report failure by returning it. The registry additionally turns
//! handler errors, panics and timeouts into a failed [`ActionOutcome`], so
//! nothing escapes [`ActionRegistry::execute`].

use crate::config::HealingConfig;
use crate::error::{HealerError, Result};
use crate::healing::safety::SafetyValidator;
use crate::healing::types::{ErrorEvent, RemediationAction, RemediationPlan, RetrySpec};
use crate::retry::retry_with_backoff;
use crate::services::{
    Collaborators, EmailGateway, HealingStore, PaymentGateway, ReplayRequest, RequestReplayer,
    SessionRegistry, TenantCache,
};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ActionContext<'a> {
    pub event: &'a ErrorEvent,
    pub plan: &'a RemediationPlan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
    pub detail: String,
}

impl ActionOutcome {
    pub fn succeeded(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action(&self) -> RemediationAction;

    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome>;
}

pub struct ActionRegistry {
    handlers: HashMap<RemediationAction, Arc<dyn ActionHandler>>,
    timeout: Duration,
}

impl ActionRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    /// Registry with the standard handler for every action kind.
    pub fn with_default_handlers(services: &Collaborators, config: &HealingConfig) -> Self {
        let mut registry = Self::new(Duration::from_secs(config.action_timeout_secs));
        registry.register(Arc::new(DataFixHandler::new(services.store.clone())));
        registry.register(Arc::new(ConfigUpdateHandler::new(services.store.clone())));
        registry.register(Arc::new(ApiRetryHandler::new(
            services.replayer.clone(),
            config.replay_allowed_hosts.clone(),
        )));
        registry.register(Arc::new(CacheClearHandler::new(services.cache.clone())));
        registry.register(Arc::new(SessionResetHandler::new(services.sessions.clone())));
        registry.register(Arc::new(NotificationResendHandler::new(
            services.store.clone(),
            services.mailer.clone(),
        )));
        registry.register(Arc::new(SyncRepairHandler::new(services.store.clone())));
        registry.register(Arc::new(PaymentRetryHandler::new(services.payments.clone())));
        registry.register(Arc::new(EscalateHandler));
        registry
    }

    /// Register a handler, replacing any previous one for the same action.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.insert(handler.action(), handler)
    }

    pub fn has_handler(&self, action: RemediationAction) -> bool {
        self.handlers.contains_key(&action)
    }

    pub async fn execute(&self, event: &ErrorEvent, plan: &RemediationPlan) -> ActionOutcome {
        let Some(handler) = self.handlers.get(&plan.action) else {
            return ActionOutcome::failed(format!("no handler registered for {}", plan.action));
        };

        let ctx = ActionContext { event, plan };
        let guarded = AssertUnwindSafe(handler.execute(&ctx)).catch_unwind();

        let outcome = match tokio::time::timeout(self.timeout, guarded).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => ActionOutcome::failed(e.to_string()),
            Ok(Err(_)) => ActionOutcome::failed(format!("{} handler panicked", plan.action)),
            Err(_) => ActionOutcome::failed(
                HealerError::timeout(plan.action.as_str(), self.timeout.as_secs()).to_string(),
            ),
        };

        if outcome.success {
            debug!(action = %plan.action, detail = %outcome.detail, "Action succeeded");
        } else {
            warn!(action = %plan.action, detail = %outcome.detail, "Action failed");
        }
        outcome
    }
}

pub struct DataFixHandler {
    store: Arc<dyn HealingStore>,
    validator: SafetyValidator,
}

impl DataFixHandler {
    pub fn new(store: Arc<dyn HealingStore>) -> Self {
        Self {
            store,
            validator: SafetyValidator::new(),
        }
    }
}

#[async_trait]
impl ActionHandler for DataFixHandler {
    fn action(&self) -> RemediationAction {
        RemediationAction::DataFix
    }

    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        let Some(mutation) = ctx.plan.mutation() else {
            return Ok(ActionOutcome::failed("DATA_FIX plan carries no mutation"));
        };
        // Registry callers outside the orchestrator skip plan validation.
        if self.validator.is_destructive(mutation) {
            return Ok(ActionOutcome::failed("refusing destructive mutation"));
        }

        let rows = self.store.apply_data_fix(&ctx.event.tenant_id, mutation).await?;
        Ok(ActionOutcome::succeeded(format!("mutation applied to {} row(s)", rows)))
    }
}

pub struct ConfigUpdateHandler {
    store: Arc<dyn HealingStore>,
}

impl ConfigUpdateHandler {
    pub fn new(store: Arc<dyn HealingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for ConfigUpdateHandler {
    fn action(&self) -> RemediationAction {
        RemediationAction::ConfigUpdate
    }

    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        let Some(patch) = ctx.plan.config_patch().filter(|p| !p.is_empty()) else {
            return Ok(ActionOutcome::failed("CONFIG_UPDATE plan carries no config patch"));
        };

        self.store.update_tenant_config(&ctx.event.tenant_id, patch).await?;
        let keys: Vec<&str> = patch.keys().map(String::as_str).collect();
        Ok(ActionOutcome::succeeded(format!("updated config keys: {}", keys.join(", "))))
    }
}

pub struct ApiRetryHandler {
    replayer: Arc<dyn RequestReplayer>,
    allowed_hosts: Vec<String>,
}

impl ApiRetryHandler {
    pub fn new(replayer: Arc<dyn RequestReplayer>, allowed_hosts: Vec<String>) -> Self {
        Self {
            replayer,
            allowed_hosts,
        }
    }
}

#[async_trait]
impl ActionHandler for ApiRetryHandler {
    fn action(&self) -> RemediationAction {
        RemediationAction::ApiRetry
    }

    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        let Some(request) = ReplayRequest::from_event(ctx.event) else {
            return Ok(ActionOutcome::failed("no replayable request captured in the error context"));
        };
        if !request.host_allowed(&self.allowed_hosts) {
            warn!(tenant = %ctx.event.tenant_id, url = %request.url, "Replay target is not an allowed host");
            return Ok(ActionOutcome::failed(format!(
                "replay target {} is not an allowed host",
                request.url
            )));
        }
        let spec = ctx.plan.retry_spec().cloned().unwrap_or_default();

        let status = with_retry_spec(&spec, || self.replayer.replay(&request)).await?;
        Ok(ActionOutcome::succeeded(format!(
            "{} {} succeeded with status {}",
            request.method, request.url, status
        )))
    }
}

pub struct CacheClearHandler {
    cache: Arc<dyn TenantCache>,
}

impl CacheClearHandler {
    pub fn new(cache: Arc<dyn TenantCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ActionHandler for CacheClearHandler {
    fn action(&self) -> RemediationAction {
        RemediationAction::CacheClear
    }

    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        let namespaces: Vec<String> = ctx
            .event
            .context
            .get("cache_namespaces")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let cleared = self.cache.clear_tenant(&ctx.event.tenant_id, &namespaces).await?;
        Ok(ActionOutcome::succeeded(format!("cleared {} cache namespace(s)", cleared)))
    }
}

pub struct SessionResetHandler {
    sessions: Arc<dyn SessionRegistry>,
}

impl SessionResetHandler {
    pub fn new(sessions: Arc<dyn SessionRegistry>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl ActionHandler for SessionResetHandler {
    fn action(&self) -> RemediationAction {
        RemediationAction::SessionReset
    }

    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        let count = self.sessions.invalidate_tenant(&ctx.event.tenant_id).await?;
        Ok(ActionOutcome::succeeded(format!("invalidated {} session(s)", count)))
    }
}

pub struct NotificationResendHandler {
    store: Arc<dyn HealingStore>,
    mailer: Arc<dyn EmailGateway>,
}

impl NotificationResendHandler {
    pub fn new(store: Arc<dyn HealingStore>, mailer: Arc<dyn EmailGateway>) -> Self {
        Self { store, mailer }
    }
}

#[async_trait]
impl ActionHandler for NotificationResendHandler {
    fn action(&self) -> RemediationAction {
        RemediationAction::NotificationResend
    }

    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        let tenant_id = &ctx.event.tenant_id;
        let pending = self.store.get_failed_notifications(tenant_id).await?;
        if pending.is_empty() {
            return Ok(ActionOutcome::failed("no failed notifications to resend"));
        }

        let mut delivered = 0;
        let mut still_failing = Vec::new();
        for notification in &pending {
            match self
                .mailer
                .send_email(&notification.recipient, &notification.subject, &notification.body)
                .await
            {
                Ok(()) => {
                    self.store.mark_notification_delivered(tenant_id, &notification.id).await?;
                    delivered += 1;
                }
                Err(e) => {
                    debug!(notification = %notification.id, error = %e, "Resend failed");
                    still_failing.push(notification.id.as_str());
                }
            }
        }

        if still_failing.is_empty() {
            Ok(ActionOutcome::succeeded(format!("resent {} notification(s)", delivered)))
        } else {
            Ok(ActionOutcome::failed(format!(
                "resent {} of {}; still failing: {}",
                delivered,
                pending.len(),
                still_failing.join(", ")
            )))
        }
    }
}

pub struct SyncRepairHandler {
    store: Arc<dyn HealingStore>,
}

impl SyncRepairHandler {
    pub fn new(store: Arc<dyn HealingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for SyncRepairHandler {
    fn action(&self) -> RemediationAction {
        RemediationAction::SyncRepair
    }

    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        self.store.trigger_data_sync(&ctx.event.tenant_id).await?;
        Ok(ActionOutcome::succeeded("resynchronization job triggered"))
    }
}

pub struct PaymentRetryHandler {
    payments: Arc<dyn PaymentGateway>,
}

impl PaymentRetryHandler {
    pub fn new(payments: Arc<dyn PaymentGateway>) -> Self {
        Self { payments }
    }
}

#[async_trait]
impl ActionHandler for PaymentRetryHandler {
    fn action(&self) -> RemediationAction {
        RemediationAction::PaymentRetry
    }

    /// One attempt per healing run, keyed on the event id. A charge whose
    /// outcome is unknown is left for support rather than re-submitted.
    async fn execute(&self, ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        let reference = ctx
            .plan
            .retry_spec()
            .and_then(|spec| spec.reference.clone())
            .or_else(|| ctx.event.context_str("payment_reference").map(String::from));
        let Some(reference) = reference else {
            return Ok(ActionOutcome::failed("no payment reference available"));
        };

        let idempotency_key = ctx.event.id.to_string();
        self.payments
            .retry_payment(&ctx.event.tenant_id, &reference, &idempotency_key)
            .await?;
        Ok(ActionOutcome::succeeded(format!("payment {} retried successfully", reference)))
    }
}

/// Plans asking for escalation have nothing to execute.
pub struct EscalateHandler;

#[async_trait]
impl ActionHandler for EscalateHandler {
    fn action(&self) -> RemediationAction {
        RemediationAction::Escalate
    }

    async fn execute(&self, _ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        Ok(ActionOutcome::failed("plan requested escalation"))
    }
}

async fn with_retry_spec<F, Fut, T>(spec: &RetrySpec, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let retries = spec.max_attempts.clamp(1, 10) - 1;
    retry_with_backoff(retries, Duration::from_millis(spec.backoff_ms.min(10_000)), f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healing::testing::{Outbox, PanickingHandler, StaticReplayer};
    use crate::healing::types::{ActionPayload, ErrorReport, FailedNotification, Severity};
    use crate::services::InMemoryBackend;
    use serde_json::json;
    use std::sync::Mutex;

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        outbox: Arc<Outbox>,
        replayer: Arc<StaticReplayer>,
        registry: ActionRegistry,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::new());
        let outbox = Arc::new(Outbox::default());
        let replayer = Arc::new(StaticReplayer::new(vec![Ok(200)]));
        let services = Collaborators::in_memory(backend.clone(), outbox.clone(), replayer.clone());
        Fixture {
            registry: ActionRegistry::with_default_handlers(&services, &config()),
            backend,
            outbox,
            replayer,
        }
    }

    fn config() -> HealingConfig {
        HealingConfig {
            action_timeout_secs: 5,
            replay_allowed_hosts: vec!["eld.example".to_string()],
            ..HealingConfig::default()
        }
    }

    fn event(report: ErrorReport) -> ErrorEvent {
        ErrorEvent::from_report(report, Severity::Medium)
    }

    #[tokio::test]
    async fn test_every_action_has_a_handler() {
        let f = fixture();
        for action in RemediationAction::ALL {
            assert!(f.registry.has_handler(action), "missing handler for {action}");
        }
    }

    #[tokio::test]
    async fn test_cache_clear_uses_context_namespaces() {
        let f = fixture();
        f.backend.cache_put("T1", "loads", "L1", json!(1)).await;
        f.backend.cache_put("T1", "rates", "R1", json!(2)).await;

        let e = event(ErrorReport::new("T1", "DataStoreConnectionError", "connection refused")
            .with_context("cache_namespaces", json!(["loads"])));
        let plan = RemediationPlan::new(RemediationAction::CacheClear, "flush", 0.9);

        let outcome = f.registry.execute(&e, &plan).await;
        assert!(outcome.success);
        assert_eq!(f.backend.cache_namespaces("T1").await, vec!["rates".to_string()]);
    }

    #[tokio::test]
    async fn test_config_update_requires_patch() {
        let f = fixture();
        let e = event(ErrorReport::new("T1", "ConfigurationError", "missing config eld_key"));

        let empty = RemediationPlan::new(RemediationAction::ConfigUpdate, "patch", 0.9);
        assert!(!f.registry.execute(&e, &empty).await.success);

        let mut patch = serde_json::Map::new();
        patch.insert("eld_key".into(), json!("abc"));
        let plan = empty.clone().with_payload(ActionPayload::ConfigPatch(patch));
        assert!(f.registry.execute(&e, &plan).await.success);
        assert_eq!(f.backend.tenant_config("T1").await.get("eld_key"), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn test_data_fix_refuses_destructive_sql() {
        let f = fixture();
        let e = event(ErrorReport::new("T1", "ValidationError", "validation failed"));
        let plan = RemediationPlan::new(RemediationAction::DataFix, "fix", 0.99)
            .with_payload(ActionPayload::Mutation("TRUNCATE loads".into()));

        let outcome = f.registry.execute(&e, &plan).await;
        assert!(!outcome.success);
        assert!(f.backend.applied_fixes().await.is_empty());
    }

    #[tokio::test]
    async fn test_data_fix_applies_targeted_mutation() {
        let f = fixture();
        let e = event(ErrorReport::new("T1", "ValidationError", "load 1042 has no status"));
        let sql = "UPDATE loads SET status = 'delivered' WHERE id = 1042 AND tenant_id = 'T1'";
        let plan = RemediationPlan::new(RemediationAction::DataFix, "restore status", 0.95)
            .with_payload(ActionPayload::Mutation(sql.into()));

        let outcome = f.registry.execute(&e, &plan).await;
        assert!(outcome.success, "{}", outcome.detail);
        assert!(outcome.detail.contains("1 row(s)"));
        assert_eq!(f.backend.applied_fixes().await, vec![("T1".to_string(), sql.to_string())]);
    }

    #[tokio::test]
    async fn test_session_reset_invalidates_tenant_sessions() {
        let f = fixture();
        f.backend.open_session("T1", "s-1").await;
        f.backend.open_session("T1", "s-2").await;
        f.backend.open_session("T2", "s-9").await;

        let e = event(ErrorReport::new("T1", "AuthenticationError", "session token rejected"));
        let plan = RemediationPlan::new(RemediationAction::SessionReset, "reset", 0.9);

        let outcome = f.registry.execute(&e, &plan).await;
        assert!(outcome.success);
        assert_eq!(outcome.detail, "invalidated 2 session(s)");
        assert_eq!(f.backend.session_count("T1").await, 0);
        assert_eq!(f.backend.session_count("T2").await, 1);
    }

    #[tokio::test]
    async fn test_notification_resend_marks_delivered() {
        let f = fixture();
        for (id, to) in [("n1", "dispatch@t1.example"), ("n2", "bounce@t1.example")] {
            f.backend
                .add_failed_notification("T1", FailedNotification {
                    id: id.into(),
                    recipient: to.into(),
                    subject: "Load tendered".into(),
                    body: "L-100".into(),
                    attempts: 1,
                })
                .await;
        }
        f.outbox.fail_for("bounce@t1.example");

        let e = event(ErrorReport::new("T1", "EmailDeliveryError", "smtp 421"));
        let plan = RemediationPlan::new(RemediationAction::NotificationResend, "resend", 0.9);

        let outcome = f.registry.execute(&e, &plan).await;
        assert!(!outcome.success);
        assert!(outcome.detail.contains("n2"));

        let remaining = f.backend.get_failed_notifications("T1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "n2");
        assert_eq!(f.outbox.sent_to("dispatch@t1.example").len(), 1);
    }

    #[tokio::test]
    async fn test_payment_retry_uses_context_reference() {
        let f = fixture();
        f.backend.add_failed_payment("T1", "pay_42").await;

        let e = event(ErrorReport::new("T1", "PaymentProcessingError", "payment failed")
            .with_context("payment_reference", json!("pay_42")));
        let plan = RemediationPlan::new(RemediationAction::PaymentRetry, "retry", 0.9)
            .with_payload(ActionPayload::Retry(RetrySpec {
                max_attempts: 1,
                backoff_ms: 1,
                reference: None,
            }));

        assert!(f.registry.execute(&e, &plan).await.success);
        // The failed payment is gone, so a second retry cannot succeed.
        assert!(!f.registry.execute(&e, &plan).await.success);
    }

    /// Payment gateway that always answers with a transient-looking failure.
    #[derive(Default)]
    struct FlakyPayments {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PaymentGateway for FlakyPayments {
        async fn retry_payment(&self, _tenant_id: &str, _reference: &str, idempotency_key: &str) -> Result<()> {
            self.keys.lock().unwrap().push(idempotency_key.to_string());
            Err(HealerError::Store("backend returned 504: gateway timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_payment_retry_is_single_shot_with_event_key() {
        let backend = Arc::new(InMemoryBackend::new());
        let payments = Arc::new(FlakyPayments::default());
        let mut services = Collaborators::in_memory(
            backend,
            Arc::new(Outbox::default()),
            Arc::new(StaticReplayer::new(vec![])),
        );
        services.payments = payments.clone();
        let registry = ActionRegistry::with_default_handlers(&services, &config());

        let e = event(ErrorReport::new("T1", "PaymentProcessingError", "gateway timeout"));
        let plan = RemediationPlan::new(RemediationAction::PaymentRetry, "retry", 0.9)
            .with_payload(ActionPayload::Retry(RetrySpec {
                max_attempts: 5,
                backoff_ms: 1,
                reference: Some("pay_42".into()),
            }));

        let outcome = registry.execute(&e, &plan).await;
        assert!(!outcome.success);
        assert_eq!(*payments.keys.lock().unwrap(), vec![e.id.to_string()]);
    }

    #[tokio::test]
    async fn test_api_retry_refuses_hosts_off_the_allow_list() {
        let f = fixture();
        let plan = RemediationPlan::new(RemediationAction::ApiRetry, "retry", 0.9);

        let targets = [
            "http://169.254.169.254/latest/meta-data",
            "http://localhost:5432/",
            "https://eld.example.evil.test/",
        ];
        for url in targets {
            let e = event(ErrorReport::new("T1", "TimeoutError", "timed out")
                .with_context("request_url", json!(url)));
            let outcome = f.registry.execute(&e, &plan).await;
            assert!(!outcome.success, "replayed {url}");
            assert!(outcome.detail.contains("not an allowed host"));
        }
        assert_eq!(f.replayer.calls(), 0);
    }

    #[tokio::test]
    async fn test_api_retry_needs_captured_request() {
        let f = fixture();
        let plan = RemediationPlan::new(RemediationAction::ApiRetry, "retry", 0.9);

        let bare = event(ErrorReport::new("T1", "TimeoutError", "timed out"));
        assert!(!f.registry.execute(&bare, &plan).await.success);
        assert_eq!(f.replayer.calls(), 0);

        let captured = event(ErrorReport::new("T1", "TimeoutError", "timed out")
            .with_context("request_url", json!("https://eld.example/v1/logs")));
        assert!(f.registry.execute(&captured, &plan).await.success);
        assert_eq!(f.replayer.calls(), 1);
    }

    #[tokio::test]
    async fn test_escalate_always_fails() {
        let f = fixture();
        let e = event(ErrorReport::new("T1", "UnknownError", "?"));
        let outcome = f.registry.execute(&e, &RemediationPlan::escalation("unsure")).await;
        assert!(!outcome.success);
    }

    struct SlowHandler;

    #[async_trait]
    impl ActionHandler for SlowHandler {
        fn action(&self) -> RemediationAction {
            RemediationAction::SessionReset
        }

        async fn execute(&self, _ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ActionOutcome::succeeded("too late"))
        }
    }

    #[tokio::test]
    async fn test_registry_contains_panics_and_timeouts() {
        let mut registry = ActionRegistry::new(Duration::from_millis(50));
        registry.register(Arc::new(PanickingHandler(RemediationAction::SyncRepair)));
        registry.register(Arc::new(SlowHandler));

        let e = event(ErrorReport::new("T1", "SyncError", "sync failed"));

        let panicked = registry
            .execute(&e, &RemediationPlan::new(RemediationAction::SyncRepair, "sync", 0.9))
            .await;
        assert!(!panicked.success);
        assert!(panicked.detail.contains("panicked"));

        let slow = registry
            .execute(&e, &RemediationPlan::new(RemediationAction::SessionReset, "reset", 0.9))
            .await;
        assert!(!slow.success);
        assert!(slow.detail.contains("timed out"));

        let missing = registry
            .execute(&e, &RemediationPlan::new(RemediationAction::CacheClear, "flush", 0.9))
            .await;
        assert!(!missing.success);
    }
}
