//! Healing Orchestrator - drives one failure through the remediation pipeline
//!
//! Ingest → dedup → audit → gate → plan → validate → execute → record →
//! notify, escalating to support whenever a step refuses or fails. Each
//! signature has at most one run in flight; the in-flight marker is held by
//! an RAII guard and released on every exit path, panics included.

use crate::config::HealingConfig;
use crate::error::Result;
use crate::healing::actions::ActionRegistry;
use crate::healing::classifier::{ErrorClassifier, GateDecision, GateRejection};
use crate::healing::inflight::InFlightSet;
use crate::healing::planner::PlanGenerator;
use crate::healing::safety::SafetyValidator;
use crate::healing::types::{
    ErrorEvent, ErrorReport, HealingAttempt, RemediationAction, RemediationPlan,
};
use crate::services::{Collaborators, EmailGateway, HealingStore};
use futures_util::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where a pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealingStage {
    Idle,
    Ingested,
    Gated,
    PlanGenerated,
    Validated,
    Executed,
    Recorded,
    Notified,
    Escalated,
}

impl fmt::Display for HealingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealingStage::Idle => "idle",
            HealingStage::Ingested => "ingested",
            HealingStage::Gated => "gated",
            HealingStage::PlanGenerated => "plan_generated",
            HealingStage::Validated => "validated",
            HealingStage::Executed => "executed",
            HealingStage::Recorded => "recorded",
            HealingStage::Notified => "notified",
            HealingStage::Escalated => "escalated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EscalationReason {
    NotHealable(GateRejection),
    LowConfidence {
        confidence: f64,
        plan_description: String,
        veto: Option<String>,
    },
    ExecutionFailed {
        action: RemediationAction,
        detail: String,
    },
    /// The generator itself proposed handing the error to a human.
    PlanRequested { plan_description: String },
    Internal(String),
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationReason::NotHealable(rejection) => write!(f, "not auto-healable: {}", rejection),
            EscalationReason::LowConfidence { confidence, veto: Some(veto), .. } => {
                write!(f, "plan rejected ({}), confidence {:.2}", veto, confidence)
            }
            EscalationReason::LowConfidence { confidence, .. } => {
                write!(f, "plan confidence {:.2} is below the execution threshold", confidence)
            }
            EscalationReason::ExecutionFailed { action, detail } => {
                write!(f, "{} failed: {}", action, detail)
            }
            EscalationReason::PlanRequested { plan_description } => {
                write!(f, "remediation plan requested escalation: {}", plan_description)
            }
            EscalationReason::Internal(msg) => write!(f, "internal healing failure: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealingOutcome {
    /// Another run for the same signature was already in flight.
    Deduplicated,
    Healed { action: RemediationAction },
    Escalated { reason: EscalationReason },
}

pub struct HealingOrchestrator {
    classifier: ErrorClassifier,
    generator: Arc<dyn PlanGenerator>,
    validator: SafetyValidator,
    registry: ActionRegistry,
    store: Arc<dyn HealingStore>,
    mailer: Arc<dyn EmailGateway>,
    in_flight: InFlightSet,
    confidence_threshold: f64,
    support_email: String,
}

impl HealingOrchestrator {
    /// Orchestrator with the standard action handlers wired to `services`.
    pub fn new(config: &HealingConfig, generator: Arc<dyn PlanGenerator>, services: &Collaborators) -> Self {
        let registry = ActionRegistry::with_default_handlers(services, config);
        Self::with_registry(config, generator, registry, services)
    }

    pub fn with_registry(
        config: &HealingConfig,
        generator: Arc<dyn PlanGenerator>,
        registry: ActionRegistry,
        services: &Collaborators,
    ) -> Self {
        Self {
            classifier: ErrorClassifier::new(config.min_success_rate),
            generator,
            validator: SafetyValidator::new(),
            registry,
            store: services.store.clone(),
            mailer: services.mailer.clone(),
            in_flight: InFlightSet::new(),
            confidence_threshold: config.confidence_threshold,
            support_email: config.support_email.clone(),
        }
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    pub fn store(&self) -> &Arc<dyn HealingStore> {
        &self.store
    }

    /// Run [`Self::handle_error`] on a detached task.
    pub fn spawn(self: &Arc<Self>, report: ErrorReport) -> JoinHandle<HealingOutcome> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.handle_error(report).await })
    }

    pub async fn handle_error(&self, report: ErrorReport) -> HealingOutcome {
        let severity = ErrorClassifier::severity(&report.error_type, &report.message);
        let event = ErrorEvent::from_report(report, severity);
        self.enter(HealingStage::Ingested, &event);

        let Some(guard) = self.in_flight.try_acquire(event.signature()) else {
            debug!(signature = %event.signature(), "Healing already in flight, dropping duplicate");
            return HealingOutcome::Deduplicated;
        };
        debug!(signature = %guard.signature(), in_flight = self.in_flight.len(), "Healing slot acquired");

        let outcome = match AssertUnwindSafe(self.run_pipeline(&event)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(signature = %event.signature(), error = %e, "Healing pipeline failed");
                self.escalate(&event, EscalationReason::Internal(e.to_string()), None, None)
                    .await
            }
            Err(_) => {
                error!(signature = %event.signature(), "Healing pipeline panicked");
                self.escalate(
                    &event,
                    EscalationReason::Internal("healing pipeline panicked".to_string()),
                    None,
                    None,
                )
                .await
            }
        };

        self.enter(HealingStage::Idle, &event);
        outcome
    }

    async fn run_pipeline(&self, event: &ErrorEvent) -> Result<HealingOutcome> {
        if let Err(e) = self.store.create_error_log(event).await {
            warn!(signature = %event.signature(), error = %e, "Failed to write audit log entry");
        }

        let history = self
            .store
            .get_healing_history(&event.tenant_id, &event.error_type)
            .await?;

        let category = match self.classifier.gate(event, &history) {
            GateDecision::Proceed(category) => category,
            GateDecision::Escalate(rejection) => {
                return Ok(self
                    .escalate(event, EscalationReason::NotHealable(rejection), None, None)
                    .await);
            }
        };
        self.enter(HealingStage::Gated, event);
        debug!(signature = %event.signature(), ?category, "Error passed the healability gate");

        let mut plan = self.generator.generate(event).await;
        self.enter(HealingStage::PlanGenerated, event);

        self.validator.validate(&mut plan);
        self.enter(HealingStage::Validated, event);

        if plan.confidence() < self.confidence_threshold {
            let reason = EscalationReason::LowConfidence {
                confidence: plan.confidence(),
                plan_description: plan.description.clone(),
                veto: plan.veto_reason().map(String::from),
            };
            return Ok(self.escalate(event, reason, Some(&plan), None).await);
        }

        // Nothing was attempted, so the signature's history stays untouched.
        if plan.action == RemediationAction::Escalate {
            let reason = EscalationReason::PlanRequested {
                plan_description: plan.description.clone(),
            };
            return Ok(self.escalate(event, reason, Some(&plan), None).await);
        }

        info!(
            signature = %event.signature(),
            action = %plan.action,
            confidence = plan.confidence(),
            "Executing remediation plan"
        );
        let result = self.registry.execute(event, &plan).await;
        self.enter(HealingStage::Executed, event);

        if result.success {
            self.store
                .create_healing_record(&HealingAttempt::record(event, &plan, true))
                .await?;
            self.enter(HealingStage::Recorded, event);

            self.notify_admins(event, &plan, &result.detail).await;
            self.enter(HealingStage::Notified, event);

            info!(signature = %event.signature(), action = %plan.action, "Error healed");
            return Ok(HealingOutcome::Healed { action: plan.action });
        }

        let rollback_note = self.roll_back(event, &plan).await;
        if let Err(e) = self
            .store
            .create_healing_record(&HealingAttempt::record(event, &plan, false))
            .await
        {
            warn!(signature = %event.signature(), error = %e, "Failed to record failed attempt");
        }

        let reason = EscalationReason::ExecutionFailed {
            action: plan.action,
            detail: result.detail,
        };
        Ok(self.escalate(event, reason, Some(&plan), rollback_note).await)
    }

    /// Best-effort undo after a failed action. DATA_FIX rollbacks are applied
    /// as compensating mutations when they pass the safety scan; any other
    /// rollback is left as a manual step for support.
    async fn roll_back(&self, event: &ErrorEvent, plan: &RemediationPlan) -> Option<String> {
        let rollback = plan.rollback.as_deref()?;

        if plan.action != RemediationAction::DataFix {
            return Some(format!("Manual rollback step: {}", rollback));
        }

        if self.validator.is_destructive(rollback) {
            warn!(signature = %event.signature(), "Refusing destructive rollback mutation");
            return Some(format!("Rollback refused as destructive: {}", rollback));
        }

        match self.store.apply_data_fix(&event.tenant_id, rollback).await {
            Ok(rows) => {
                info!(signature = %event.signature(), rows, "Rollback mutation applied");
                Some(format!("Rollback applied ({} row(s)): {}", rows, rollback))
            }
            Err(e) => {
                warn!(signature = %event.signature(), error = %e, "Rollback failed");
                Some(format!("Rollback failed ({}): {}", e, rollback))
            }
        }
    }

    async fn notify_admins(&self, event: &ErrorEvent, plan: &RemediationPlan, detail: &str) {
        let admins = match self.store.get_tenant_admins(&event.tenant_id).await {
            Ok(admins) => admins,
            Err(e) => {
                warn!(tenant = %event.tenant_id, error = %e, "Could not load tenant admins");
                return;
            }
        };

        let subject = format!("Issue resolved automatically: {}", event.error_type);
        for admin in admins {
            let body = format!(
                "Hello {},\n\n\
                 An issue affecting your account was detected and resolved automatically.\n\n\
                 Error: {}\n\
                 Detected: {}\n\
                 Action taken: {} ({})\n\
                 Result: {}\n\n\
                 No further action is needed on your side.",
                admin.name,
                event.message,
                event.timestamp.to_rfc3339(),
                plan.description,
                plan.action,
                detail,
            );
            if let Err(e) = self.mailer.send_email(&admin.email, &subject, &body).await {
                warn!(tenant = %event.tenant_id, to = %admin.email, error = %e, "Admin notification failed");
            }
        }
    }

    async fn escalate(
        &self,
        event: &ErrorEvent,
        reason: EscalationReason,
        plan: Option<&RemediationPlan>,
        rollback_note: Option<String>,
    ) -> HealingOutcome {
        self.enter(HealingStage::Escalated, event);
        warn!(
            signature = %event.signature(),
            severity = %event.severity,
            reason = %reason,
            "Escalating error to support"
        );

        let subject = format!(
            "[{}] Healing escalation: {} for tenant {}",
            event.severity.to_string().to_uppercase(),
            event.error_type,
            event.tenant_id
        );

        let mut body = format!(
            "Automatic healing did not resolve this error.\n\n\
             Tenant: {}\n\
             Error type: {}\n\
             Severity: {}\n\
             Message: {}\n\
             Endpoint: {}\n\
             User: {}\n\
             Event id: {}\n\
             Fingerprint: {}\n\
             Detected: {}\n\n\
             Reason: {}\n",
            event.tenant_id,
            event.error_type,
            event.severity,
            event.message,
            event.endpoint.as_deref().unwrap_or("-"),
            event.user_id.as_deref().unwrap_or("-"),
            event.id,
            event.fingerprint(),
            event.timestamp.to_rfc3339(),
            reason,
        );

        if let Some(plan) = plan {
            body.push_str(&format!(
                "\nAttempted plan: {} ({})\nConfidence: {:.2}\n",
                plan.description,
                plan.action,
                plan.confidence()
            ));
            if let Some(sql) = plan.mutation() {
                body.push_str(&format!("Mutation: {}\n", sql));
            }
            if rollback_note.is_none() {
                if let Some(rollback) = &plan.rollback {
                    body.push_str(&format!("Rollback plan: {}\n", rollback));
                }
            }
        }
        if let Some(note) = rollback_note {
            body.push_str(&format!("{}\n", note));
        }
        if let Some(stack) = &event.stack_trace {
            body.push_str(&format!("\nStack trace:\n{}\n", stack));
        }

        if let Err(e) = self.mailer.send_email(&self.support_email, &subject, &body).await {
            error!(signature = %event.signature(), error = %e, "Support escalation email failed");
        }

        HealingOutcome::Escalated { reason }
    }

    fn enter(&self, stage: HealingStage, event: &ErrorEvent) {
        debug!(stage = %stage, tenant = %event.tenant_id, error_type = %event.error_type, "Healing stage");
    }
}
