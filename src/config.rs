use crate::error::{HealerError, Result};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FLEETOPS_HEALER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealerSettings {
    #[serde(default)]
    pub healing: HealingConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub mail: MailConfig,
}

/// Thresholds and bounds for the remediation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    /// Plans below this confidence are escalated instead of executed.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Historical success rate a signature must exceed to keep auto-healing.
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    #[serde(default = "default_plan_timeout")]
    pub plan_timeout_secs: u64,
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
    #[serde(default = "default_plan_retries")]
    pub plan_max_retries: u32,
    #[serde(default = "default_support_email")]
    pub support_email: String,
    /// Hosts API_RETRY may re-issue captured requests to. A leading dot
    /// admits subdomains. Empty disables replay.
    #[serde(default)]
    pub replay_allowed_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    #[default]
    Openrouter,
    Claude,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Hides stack traces from error responses.
    #[serde(default = "default_true")]
    pub production: bool,
    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Memory,
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// HTTP mail relay; when unset, outgoing mail is only logged.
    pub gateway_url: Option<String>,
    pub api_token: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f64 {
    0.8
}

fn default_min_success_rate() -> f64 {
    0.7
}

fn default_plan_timeout() -> u64 {
    30
}

fn default_action_timeout() -> u64 {
    60
}

fn default_plan_retries() -> u32 {
    2
}

fn default_support_email() -> String {
    "support@fleetops.local".to_string()
}

fn default_provider_timeout() -> u64 {
    25
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8088
}

fn default_slow_request_ms() -> u64 {
    5000
}

fn default_backend_timeout() -> u64 {
    10
}

fn default_from_address() -> String {
    "healer@fleetops.local".to_string()
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            min_success_rate: default_min_success_rate(),
            plan_timeout_secs: default_plan_timeout(),
            action_timeout_secs: default_action_timeout(),
            plan_max_retries: default_plan_retries(),
            support_email: default_support_email(),
            replay_allowed_hosts: Vec::new(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: ProviderType::default(),
            api_key: None,
            base_url: None,
            model: None,
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            production: true,
            slow_request_ms: default_slow_request_ms(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: None,
            api_token: None,
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            api_token: None,
            from_address: default_from_address(),
        }
    }
}

impl HealingConfig {
    /// Rejects threshold values outside the unit interval.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("min_success_rate", self.min_success_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(HealerError::Configuration(format!(
                    "healing.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.plan_timeout_secs == 0 || self.action_timeout_secs == 0 {
            return Err(HealerError::Configuration(
                "healing timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct ConfigManager {
    settings: HealerSettings,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::from_path(config_path)
    }

    pub fn from_path(config_path: PathBuf) -> Result<Self> {
        let settings = Self::load_or_default(&config_path)?;
        settings.healing.validate()?;

        Ok(Self {
            settings,
            config_path,
        })
    }

    pub fn save(&self) -> Result<()> {
        let toml = toml::to_string_pretty(&self.settings)
            .map_err(|e| HealerError::Configuration(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.config_path, toml)
            .map_err(|e| HealerError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> &HealerSettings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn default_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "fleetops", "fleetops-healer").ok_or_else(|| {
            HealerError::Configuration("Could not determine config directory".to_string())
        })?;

        Ok(project_dirs.config_dir().join("config.toml"))
    }

    fn load_or_default(path: &Path) -> Result<HealerSettings> {
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }

        let s = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| HealerError::Configuration(format!("Failed to build config: {}", e)))?;

        s.try_deserialize().map_err(|e| {
            HealerError::Configuration(format!("Failed to deserialize config: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::from_path(dir.path().join("absent.toml")).unwrap();
        let settings = manager.get();

        assert_eq!(settings.healing.confidence_threshold, 0.8);
        assert_eq!(settings.healing.min_success_rate, 0.7);
        assert!(settings.healing.replay_allowed_hosts.is_empty());
        assert_eq!(settings.backend.kind, BackendKind::Memory);
        assert!(settings.server.production);
    }

    #[test]
    fn test_file_overrides_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[healing]
confidence_threshold = 0.9
support_email = "ops@carrier.example"
replay_allowed_hosts = ["api.dat.example", ".samsara.example"]

[backend]
kind = "rest"
base_url = "http://backend:8000"
"#,
        )
        .unwrap();

        let manager = ConfigManager::from_path(path.clone()).unwrap();
        assert_eq!(manager.get().healing.confidence_threshold, 0.9);
        assert_eq!(manager.get().healing.plan_timeout_secs, 30);
        assert_eq!(manager.get().healing.support_email, "ops@carrier.example");
        assert_eq!(manager.get().backend.kind, BackendKind::Rest);

        manager.save().unwrap();
        let reloaded = ConfigManager::from_path(path).unwrap();
        assert_eq!(reloaded.get().backend.base_url.as_deref(), Some("http://backend:8000"));
        assert_eq!(reloaded.get().healing.replay_allowed_hosts.len(), 2);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[healing]\nmin_success_rate = 1.5\n").unwrap();

        assert!(matches!(
            ConfigManager::from_path(path),
            Err(HealerError::Configuration(_))
        ));
    }
}
