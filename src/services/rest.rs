//! Collaborators backed by the platform's REST backend.

use crate::config::BackendConfig;
use crate::error::{HealerError, Result};
use crate::healing::types::{Contact, ErrorEvent, FailedNotification, HealingAttempt};
use crate::services::{HealingStore, PaymentGateway, SessionRegistry, TenantCache};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

pub struct RestBackend {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            HealerError::Configuration("backend.base_url is required for the rest backend".to_string())
        })?;

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    /// `{base}/tenants/{tenant}/{segments...}` with every segment encoded.
    fn tenant_url(&self, tenant_id: &str, segments: &[&str]) -> String {
        let mut url = format!("{}/tenants/{}", self.base_url, urlencoding::encode(tenant_id));
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response.text().await.unwrap_or_default();
        Err(HealerError::Store(format!(
            "backend returned {}: {}",
            status.as_u16(),
            detail.chars().take(200).collect::<String>()
        )))
    }

    fn payment_retry_request(&self, tenant_id: &str, reference: &str, idempotency_key: &str) -> RequestBuilder {
        let url = self.tenant_url(tenant_id, &["payments", reference, "retry"]);
        self.request(Method::POST, url).header(IDEMPOTENCY_HEADER, idempotency_key)
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        Ok(self.send(builder).await?.json().await?)
    }
}

#[async_trait]
impl HealingStore for RestBackend {
    async fn create_error_log(&self, event: &ErrorEvent) -> Result<()> {
        let url = self.tenant_url(&event.tenant_id, &["error-logs"]);
        let body = serde_json::json!({
            "event": event,
            "fingerprint": event.fingerprint(),
        });
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn create_healing_record(&self, attempt: &HealingAttempt) -> Result<()> {
        let url = self.tenant_url(&attempt.tenant_id, &["healing-records"]);
        self.send(self.request(Method::POST, url).json(attempt)).await?;
        Ok(())
    }

    async fn get_healing_history(&self, tenant_id: &str, error_type: &str) -> Result<Vec<HealingAttempt>> {
        let url = self.tenant_url(tenant_id, &["healing-records"]);
        self.fetch(self.request(Method::GET, url).query(&[("error_type", error_type)]))
            .await
    }

    async fn get_tenant_admins(&self, tenant_id: &str) -> Result<Vec<Contact>> {
        let url = self.tenant_url(tenant_id, &["admins"]);
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn update_tenant_config(
        &self,
        tenant_id: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let url = self.tenant_url(tenant_id, &["config"]);
        self.send(self.request(Method::PATCH, url).json(patch)).await?;
        Ok(())
    }

    async fn get_failed_notifications(&self, tenant_id: &str) -> Result<Vec<FailedNotification>> {
        let url = self.tenant_url(tenant_id, &["notifications"]);
        self.fetch(self.request(Method::GET, url).query(&[("status", "failed")]))
            .await
    }

    async fn mark_notification_delivered(&self, tenant_id: &str, notification_id: &str) -> Result<()> {
        let url = self.tenant_url(tenant_id, &["notifications", notification_id, "delivered"]);
        self.send(self.request(Method::POST, url)).await?;
        Ok(())
    }

    async fn trigger_data_sync(&self, tenant_id: &str) -> Result<()> {
        let url = self.tenant_url(tenant_id, &["sync-jobs"]);
        let body = serde_json::json!({ "reason": "self-healing" });
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    async fn apply_data_fix(&self, tenant_id: &str, mutation: &str) -> Result<u64> {
        let url = self.tenant_url(tenant_id, &["data-fixes"]);
        let body = serde_json::json!({ "mutation": mutation });
        let response: serde_json::Value = self.fetch(self.request(Method::POST, url).json(&body)).await?;
        Ok(response["rows_affected"].as_u64().unwrap_or(0))
    }
}

#[async_trait]
impl TenantCache for RestBackend {
    async fn clear_tenant(&self, tenant_id: &str, namespaces: &[String]) -> Result<usize> {
        let url = self.tenant_url(tenant_id, &["cache", "invalidate"]);
        let body = serde_json::json!({ "namespaces": namespaces });
        let response: serde_json::Value = self.fetch(self.request(Method::POST, url).json(&body)).await?;
        Ok(response["cleared"].as_u64().unwrap_or(0) as usize)
    }
}

#[async_trait]
impl SessionRegistry for RestBackend {
    async fn invalidate_tenant(&self, tenant_id: &str) -> Result<usize> {
        let url = self.tenant_url(tenant_id, &["sessions"]);
        let response: serde_json::Value = self.fetch(self.request(Method::DELETE, url)).await?;
        Ok(response["invalidated"].as_u64().unwrap_or(0) as usize)
    }
}

#[async_trait]
impl PaymentGateway for RestBackend {
    async fn retry_payment(&self, tenant_id: &str, reference: &str, idempotency_key: &str) -> Result<()> {
        self.send(self.payment_retry_request(tenant_id, reference, idempotency_key))
            .await?;
        Ok(())
    }
}
