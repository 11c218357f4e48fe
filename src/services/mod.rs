//! Outbound collaborators of the healing pipeline.
//!
//! The orchestrator and action handlers only see these traits. Two families
//! of implementations exist: [`memory::InMemoryBackend`] for local runs and
//! tests, and [`rest::RestBackend`] for the platform's REST backend.

use crate::error::Result;
use crate::healing::types::{Contact, ErrorEvent, FailedNotification, HealingAttempt};
use async_trait::async_trait;
use std::sync::Arc;

pub mod mail;
pub mod memory;
pub mod replay;
pub mod rest;

pub use mail::{HttpEmailGateway, LogEmailGateway};
pub use memory::InMemoryBackend;
pub use replay::{HttpReplayer, ReplayRequest};
pub use rest::RestBackend;

/// Persistent store for audit entries, healing history and tenant data.
#[async_trait]
pub trait HealingStore: Send + Sync {
    async fn create_error_log(&self, event: &ErrorEvent) -> Result<()>;

    async fn create_healing_record(&self, attempt: &HealingAttempt) -> Result<()>;

    async fn get_healing_history(&self, tenant_id: &str, error_type: &str) -> Result<Vec<HealingAttempt>>;

    async fn get_tenant_admins(&self, tenant_id: &str) -> Result<Vec<Contact>>;

    async fn update_tenant_config(
        &self,
        tenant_id: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;

    async fn get_failed_notifications(&self, tenant_id: &str) -> Result<Vec<FailedNotification>>;

    async fn mark_notification_delivered(&self, tenant_id: &str, notification_id: &str) -> Result<()>;

    async fn trigger_data_sync(&self, tenant_id: &str) -> Result<()>;

    /// Apply a vetted mutation; returns the number of affected rows.
    async fn apply_data_fix(&self, tenant_id: &str, mutation: &str) -> Result<u64>;
}

#[async_trait]
pub trait EmailGateway: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

#[async_trait]
pub trait TenantCache: Send + Sync {
    /// Invalidate the given namespaces, or every namespace when empty.
    /// Returns the number of namespaces cleared.
    async fn clear_tenant(&self, tenant_id: &str, namespaces: &[String]) -> Result<usize>;
}

#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Returns the number of sessions invalidated.
    async fn invalidate_tenant(&self, tenant_id: &str) -> Result<usize>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Re-submit a failed charge. Calls repeated with the same
    /// `idempotency_key` must settle the charge at most once.
    async fn retry_payment(&self, tenant_id: &str, reference: &str, idempotency_key: &str) -> Result<()>;
}

#[async_trait]
pub trait RequestReplayer: Send + Sync {
    /// Re-issue a captured request; returns the response status.
    async fn replay(&self, request: &ReplayRequest) -> Result<u16>;
}

/// Everything the action handlers and the orchestrator talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn HealingStore>,
    pub mailer: Arc<dyn EmailGateway>,
    pub cache: Arc<dyn TenantCache>,
    pub sessions: Arc<dyn SessionRegistry>,
    pub payments: Arc<dyn PaymentGateway>,
    pub replayer: Arc<dyn RequestReplayer>,
}

impl Collaborators {
    /// Wire every store-like collaborator to one in-memory backend.
    pub fn in_memory(
        backend: Arc<InMemoryBackend>,
        mailer: Arc<dyn EmailGateway>,
        replayer: Arc<dyn RequestReplayer>,
    ) -> Self {
        Self {
            store: backend.clone(),
            mailer,
            cache: backend.clone(),
            sessions: backend.clone(),
            payments: backend,
            replayer,
        }
    }

    /// Wire every store-like collaborator to the REST backend.
    pub fn rest(
        backend: Arc<RestBackend>,
        mailer: Arc<dyn EmailGateway>,
        replayer: Arc<dyn RequestReplayer>,
    ) -> Self {
        Self {
            store: backend.clone(),
            mailer,
            cache: backend.clone(),
            sessions: backend.clone(),
            payments: backend,
            replayer,
        }
    }
}
