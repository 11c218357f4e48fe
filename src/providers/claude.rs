use crate::config::ProviderConfig;
use crate::error::{HealerError, Result};
use crate::providers::{CompletionRequest, CompletionResponse, Provider, ProviderInfo, Role};
use async_trait::async_trait;
use reqwest::Client;

const API_VERSION: &str = "2023-06-01";

pub struct ClaudeProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl ClaudeProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            client: super::build_http_client(config.timeout_secs)?,
        })
    }

    pub fn static_info() -> ProviderInfo {
        ProviderInfo {
            name: "claude".to_string(),
            display_name: "Claude (Anthropic)".to_string(),
            default_model: "claude-3-5-sonnet-20241022".to_string(),
        }
    }
}

#[async_trait]
impl Provider for ClaudeProvider {
    fn info(&self) -> ProviderInfo {
        Self::static_info()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            HealerError::ProviderNotConfigured("Anthropic API key not configured".to_string())
        })?;

        // The messages API takes the system prompt out of band.
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();

        let body = serde_json::json!({
            "model": request.model,
            "system": system.join("\n\n"),
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(1024),
            "temperature": request.temperature.unwrap_or(0.2),
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HealerError::ApiRequest(format!(
                "Anthropic API error {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let data: serde_json::Value = response.json().await?;
        let content = data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: data["id"].as_str().unwrap_or("unknown").to_string(),
            model: request.model,
            content,
            finish_reason: data["stop_reason"].as_str().map(|s| s.to_string()),
        })
    }

    fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }
}
