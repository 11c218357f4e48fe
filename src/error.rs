use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealerError {
    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store operation failed: {0}")]
    Store(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Could not parse remediation plan: {0}")]
    PlanParse(String),

    #[error("Remediation action failed: {0}")]
    Action(String),

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HealerError {
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        HealerError::Timeout {
            operation: operation.into(),
            secs,
        }
    }
}

pub type Result<T> = std::result::Result<T, HealerError>;
