use crate::error::{HealerError, Result};
use crate::healing::types::{Contact, ErrorEvent, FailedNotification, HealingAttempt};
use crate::services::{HealingStore, PaymentGateway, SessionRegistry, TenantCache};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

const MAX_ERROR_LOGS: usize = 10_000;

#[derive(Debug, Default)]
struct BackendState {
    error_logs: Vec<ErrorEvent>,
    attempts: Vec<HealingAttempt>,
    admins: HashMap<String, Vec<Contact>>,
    configs: HashMap<String, serde_json::Map<String, serde_json::Value>>,
    failed_notifications: HashMap<String, Vec<FailedNotification>>,
    sync_requests: Vec<String>,
    applied_fixes: Vec<(String, String)>,
    cache: HashMap<String, HashMap<String, HashMap<String, serde_json::Value>>>,
    sessions: HashMap<String, HashSet<String>>,
    failed_payments: HashMap<String, HashSet<String>>,
    /// idempotency key -> (tenant, reference) of charges already settled
    settled_payments: HashMap<String, (String, String)>,
}

/// Process-local backend implementing every store-like collaborator.
///
/// Readers and appenders from independent orchestrations only contend on a
/// single `RwLock`, held for the duration of one map operation.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<BackendState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_admin(&self, tenant_id: &str, contact: Contact) {
        let mut state = self.state.write().await;
        state.admins.entry(tenant_id.to_string()).or_default().push(contact);
    }

    pub async fn add_failed_notification(&self, tenant_id: &str, notification: FailedNotification) {
        let mut state = self.state.write().await;
        state
            .failed_notifications
            .entry(tenant_id.to_string())
            .or_default()
            .push(notification);
    }

    pub async fn add_failed_payment(&self, tenant_id: &str, reference: &str) {
        let mut state = self.state.write().await;
        state
            .failed_payments
            .entry(tenant_id.to_string())
            .or_default()
            .insert(reference.to_string());
    }

    pub async fn cache_put(&self, tenant_id: &str, namespace: &str, key: &str, value: serde_json::Value) {
        let mut state = self.state.write().await;
        state
            .cache
            .entry(tenant_id.to_string())
            .or_default()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub async fn cache_namespaces(&self, tenant_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state
            .cache
            .get(tenant_id)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub async fn open_session(&self, tenant_id: &str, session_id: &str) {
        let mut state = self.state.write().await;
        state
            .sessions
            .entry(tenant_id.to_string())
            .or_default()
            .insert(session_id.to_string());
    }

    pub async fn session_count(&self, tenant_id: &str) -> usize {
        let state = self.state.read().await;
        state.sessions.get(tenant_id).map(|s| s.len()).unwrap_or(0)
    }

    pub async fn error_logs(&self) -> Vec<ErrorEvent> {
        self.state.read().await.error_logs.clone()
    }

    pub async fn attempts(&self) -> Vec<HealingAttempt> {
        self.state.read().await.attempts.clone()
    }

    pub async fn tenant_config(&self, tenant_id: &str) -> serde_json::Map<String, serde_json::Value> {
        let state = self.state.read().await;
        state.configs.get(tenant_id).cloned().unwrap_or_default()
    }

    pub async fn sync_requests(&self) -> Vec<String> {
        self.state.read().await.sync_requests.clone()
    }

    pub async fn applied_fixes(&self) -> Vec<(String, String)> {
        self.state.read().await.applied_fixes.clone()
    }
}

#[async_trait]
impl HealingStore for InMemoryBackend {
    async fn create_error_log(&self, event: &ErrorEvent) -> Result<()> {
        let mut state = self.state.write().await;
        if state.error_logs.len() >= MAX_ERROR_LOGS {
            state.error_logs.remove(0);
        }
        state.error_logs.push(event.clone());
        Ok(())
    }

    async fn create_healing_record(&self, attempt: &HealingAttempt) -> Result<()> {
        self.state.write().await.attempts.push(attempt.clone());
        Ok(())
    }

    async fn get_healing_history(&self, tenant_id: &str, error_type: &str) -> Result<Vec<HealingAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.error_type == error_type)
            .cloned()
            .collect())
    }

    async fn get_tenant_admins(&self, tenant_id: &str) -> Result<Vec<Contact>> {
        let state = self.state.read().await;
        Ok(state.admins.get(tenant_id).cloned().unwrap_or_default())
    }

    async fn update_tenant_config(
        &self,
        tenant_id: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let config = state.configs.entry(tenant_id.to_string()).or_default();
        for (key, value) in patch {
            if value.is_null() {
                config.remove(key);
            } else {
                config.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn get_failed_notifications(&self, tenant_id: &str) -> Result<Vec<FailedNotification>> {
        let state = self.state.read().await;
        Ok(state
            .failed_notifications
            .get(tenant_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_notification_delivered(&self, tenant_id: &str, notification_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let pending = state
            .failed_notifications
            .get_mut(tenant_id)
            .ok_or_else(|| HealerError::Store(format!("no failed notifications for tenant {}", tenant_id)))?;
        let before = pending.len();
        pending.retain(|n| n.id != notification_id);
        if pending.len() == before {
            return Err(HealerError::Store(format!("notification {} not found", notification_id)));
        }
        Ok(())
    }

    async fn trigger_data_sync(&self, tenant_id: &str) -> Result<()> {
        self.state.write().await.sync_requests.push(tenant_id.to_string());
        Ok(())
    }

    async fn apply_data_fix(&self, tenant_id: &str, mutation: &str) -> Result<u64> {
        self.state
            .write()
            .await
            .applied_fixes
            .push((tenant_id.to_string(), mutation.to_string()));
        Ok(1)
    }
}

#[async_trait]
impl TenantCache for InMemoryBackend {
    async fn clear_tenant(&self, tenant_id: &str, namespaces: &[String]) -> Result<usize> {
        let mut state = self.state.write().await;
        let Some(tenant_cache) = state.cache.get_mut(tenant_id) else {
            return Ok(0);
        };

        if namespaces.is_empty() {
            let cleared = tenant_cache.len();
            tenant_cache.clear();
            return Ok(cleared);
        }

        Ok(namespaces
            .iter()
            .filter(|ns| tenant_cache.remove(ns.as_str()).is_some())
            .count())
    }
}

#[async_trait]
impl SessionRegistry for InMemoryBackend {
    async fn invalidate_tenant(&self, tenant_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        Ok(state.sessions.remove(tenant_id).map(|s| s.len()).unwrap_or(0))
    }
}

#[async_trait]
impl PaymentGateway for InMemoryBackend {
    async fn retry_payment(&self, tenant_id: &str, reference: &str, idempotency_key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some((tenant, settled)) = state.settled_payments.get(idempotency_key) {
            if tenant == tenant_id && settled == reference {
                return Ok(());
            }
            return Err(HealerError::Action(format!(
                "idempotency key {} already used for another payment",
                idempotency_key
            )));
        }

        let removed = state
            .failed_payments
            .get_mut(tenant_id)
            .map(|refs| refs.remove(reference))
            .unwrap_or(false);

        if removed {
            state.settled_payments.insert(
                idempotency_key.to_string(),
                (tenant_id.to_string(), reference.to_string()),
            );
            Ok(())
        } else {
            Err(HealerError::Action(format!(
                "no failed payment {} for tenant {}",
                reference, tenant_id
            )))
        }
    }
}
