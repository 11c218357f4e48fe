use crate::config::MailConfig;
use crate::error::{HealerError, Result};
use crate::services::EmailGateway;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

/// Posts mail to an HTTP relay (`{from, to, subject, text}` as JSON).
pub struct HttpEmailGateway {
    client: Client,
    url: String,
    api_token: Option<String>,
    from_address: String,
}

impl HttpEmailGateway {
    pub fn new(url: impl Into<String>, config: &MailConfig) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(15)).build()?,
            url: url.into(),
            api_token: config.api_token.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl EmailGateway for HttpEmailGateway {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let payload = serde_json::json!({
            "from": self.from_address,
            "to": to,
            "subject": subject,
            "text": body,
        });

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(HealerError::Notification(format!(
                "mail relay returned {} for {}: {}",
                status.as_u16(),
                to,
                detail
            )));
        }
        Ok(())
    }
}

/// Writes outgoing mail to the log instead of sending it.
#[derive(Debug, Default)]
pub struct LogEmailGateway;

#[async_trait]
impl EmailGateway for LogEmailGateway {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to, subject, body_len = body.len(), "Outgoing mail (log only)");
        Ok(())
    }
}
