use crate::config::ProviderConfig;
use crate::error::{HealerError, Result};
use crate::providers::{CompletionRequest, CompletionResponse, Provider, ProviderInfo};
use async_trait::async_trait;
use reqwest::Client;

/// OpenAI-compatible chat completions (OpenRouter by default).
pub struct OpenRouterProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl OpenRouterProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            client: super::build_http_client(config.timeout_secs)?,
        })
    }

    pub fn static_info() -> ProviderInfo {
        ProviderInfo {
            name: "openrouter".to_string(),
            display_name: "OpenRouter".to_string(),
            default_model: "anthropic/claude-3.5-sonnet".to_string(),
        }
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn info(&self) -> ProviderInfo {
        Self::static_info()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            HealerError::ProviderNotConfigured("OpenRouter API key not configured".to_string())
        })?;

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(0.2),
            "max_tokens": request.max_tokens,
            "stream": false,
        });
        if request.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HealerError::ApiRequest(format!(
                "OpenRouter API error {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let data: serde_json::Value = response.json().await?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        Ok(CompletionResponse {
            id: data["id"].as_str().unwrap_or("unknown").to_string(),
            model: request.model,
            content,
            finish_reason: data["choices"][0]["finish_reason"]
                .as_str()
                .map(|s| s.to_string()),
        })
    }

    fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }
}
