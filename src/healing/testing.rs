//! Test doubles for the healing pipeline.

use crate::error::{HealerError, Result};
use crate::healing::actions::{ActionContext, ActionHandler, ActionOutcome};
use crate::healing::planner::PlanGenerator;
use crate::healing::types::{ErrorEvent, RemediationAction, RemediationPlan};
use crate::services::{EmailGateway, ReplayRequest, RequestReplayer};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Returns a fixed plan and counts how often it was asked.
pub struct FakeGenerator {
    plan: RemediationPlan,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn new(plan: RemediationPlan) -> Self {
        Self {
            plan,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanGenerator for FakeGenerator {
    async fn generate(&self, _event: &ErrorEvent) -> RemediationPlan {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.plan.clone()
    }
}

pub struct PanickingGenerator;

#[async_trait]
impl PlanGenerator for PanickingGenerator {
    async fn generate(&self, _event: &ErrorEvent) -> RemediationPlan {
        panic!("generator blew up");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records outgoing mail; recipients registered with `fail_for` bounce.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<SentMail>>,
    failing: Mutex<HashSet<String>>,
}

impl Outbox {
    pub fn fail_for(&self, recipient: &str) {
        self.failing.lock().unwrap().insert(recipient.to_string());
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentMail> {
        self.sent().into_iter().filter(|m| m.to == recipient).collect()
    }
}

#[async_trait]
impl EmailGateway for Outbox {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(to) {
            return Err(HealerError::Notification(format!("mailbox {} unavailable", to)));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Answers replays from a script, then with 200 once the script runs out.
pub struct StaticReplayer {
    responses: Mutex<VecDeque<Result<u16>>>,
    calls: AtomicUsize,
}

impl StaticReplayer {
    pub fn new(responses: Vec<Result<u16>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestReplayer for StaticReplayer {
    async fn replay(&self, _request: &ReplayRequest) -> Result<u16> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses.lock().unwrap().pop_front().unwrap_or(Ok(200))
    }
}

/// Handler whose every run fails with a store error.
pub struct FailingHandler(pub RemediationAction);

#[async_trait]
impl ActionHandler for FailingHandler {
    fn action(&self) -> RemediationAction {
        self.0
    }

    async fn execute(&self, _ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        Err(HealerError::Store("backend unavailable".to_string()))
    }
}

pub struct PanickingHandler(pub RemediationAction);

#[async_trait]
impl ActionHandler for PanickingHandler {
    fn action(&self) -> RemediationAction {
        self.0
    }

    async fn execute(&self, _ctx: &ActionContext<'_>) -> Result<ActionOutcome> {
        panic!("handler poisoned");
    }
}
