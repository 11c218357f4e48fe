use crate::error::{HealerError, Result};
use crate::healing::types::ErrorEvent;
use crate::services::RequestReplayer;
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use std::collections::HashMap;
use std::time::Duration;

/// A failed outbound call captured in the error context so API_RETRY can
/// re-issue it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl ReplayRequest {
    /// Reads `request_url`, `request_method`, `request_headers` and
    /// `request_body` from the event context. Only http(s) URLs qualify.
    pub fn from_event(event: &ErrorEvent) -> Option<Self> {
        let url = event.context_str("request_url")?.to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return None;
        }

        let method = event
            .context_str("request_method")
            .unwrap_or("GET")
            .to_ascii_uppercase();

        let headers = event
            .context
            .get("request_headers")
            .and_then(|h| h.as_object())
            .map(|h| {
                h.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            method,
            url,
            headers,
            body: event.context.get("request_body").cloned(),
        })
    }

    /// Whether the target host is on `allowed`. An entry starting with `.`
    /// also admits its subdomains.
    pub fn host_allowed(&self, allowed: &[String]) -> bool {
        let Some(host) = Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };

        allowed.iter().any(|entry| {
            let entry = entry.trim().to_ascii_lowercase();
            match entry.strip_prefix('.') {
                Some(domain) => host == domain || host.ends_with(&entry),
                None => host == entry,
            }
        })
    }
}

pub struct HttpReplayer {
    client: Client,
}

impl HttpReplayer {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl RequestReplayer for HttpReplayer {
    async fn replay(&self, request: &ReplayRequest) -> Result<u16> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| HealerError::Action(format!("invalid method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(HealerError::ApiRequest(format!(
                "replayed {} {} returned {}",
                request.method,
                request.url,
                status.as_u16()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healing::types::{ErrorReport, Severity};
    use serde_json::json;

    #[test]
    fn test_request_from_context() {
        let report = ErrorReport::new("T1", "ExternalIntegrationError:dat", "timed out")
            .with_context("request_url", json!("https://api.dat.example/v2/loads"))
            .with_context("request_method", json!("post"))
            .with_context("request_headers", json!({ "x-carrier": "T1", "retries": 2 }))
            .with_context("request_body", json!({ "load_id": "L-55" }));
        let event = ErrorEvent::from_report(report, Severity::Medium);

        let request = ReplayRequest::from_event(&event).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.headers["x-carrier"], "T1");
        assert_eq!(request.body, Some(json!({ "load_id": "L-55" })));
    }

    #[test]
    fn test_host_allow_list() {
        let allowed = vec!["api.dat.example".to_string(), ".samsara.example".to_string()];
        let request = |url: &str| ReplayRequest {
            method: "GET".into(),
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        };

        assert!(request("https://api.dat.example/v2/loads").host_allowed(&allowed));
        assert!(request("https://API.DAT.example:8443/v2").host_allowed(&allowed));
        assert!(request("https://eu.samsara.example/fleet").host_allowed(&allowed));
        assert!(request("https://samsara.example/fleet").host_allowed(&allowed));

        assert!(!request("http://169.254.169.254/latest/meta-data").host_allowed(&allowed));
        assert!(!request("https://api.dat.example.attacker.test/").host_allowed(&allowed));
        assert!(!request("https://evilsamsara.example/").host_allowed(&allowed));
        assert!(!request("http://user@localhost:8080/").host_allowed(&allowed));
        assert!(!request("https://api.dat.example/v2").host_allowed(&[]));
    }

    #[test]
    fn test_non_http_urls_rejected() {
        let report = ErrorReport::new("T1", "TimeoutError", "timed out")
            .with_context("request_url", json!("file:///etc/passwd"));
        let event = ErrorEvent::from_report(report, Severity::Medium);
        assert!(ReplayRequest::from_event(&event).is_none());

        let bare = ErrorEvent::from_report(ErrorReport::new("T1", "TimeoutError", "x"), Severity::Medium);
        assert!(ReplayRequest::from_event(&bare).is_none());
    }
}
