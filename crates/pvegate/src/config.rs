use std::path::Path;

use anyhow::Context;
use pve_api::EnvironmentConfig;
use serde::Deserialize;

/// Environment variable naming the config file path.
pub const ENV_CONFIG_PATH: &str = "PVEGATE_CONFIG";
/// Environment variable holding the operator bearer token.
pub const ENV_API_TOKEN: &str = "PVEGATE_API_TOKEN";
/// Config file used when `PVEGATE_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Top-level gateway configuration, loaded from a JSON object file.
///
/// Token secrets never live here; each environment names the process env var
/// that carries its secret.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub listen_addr: String,
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: String,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    pub environments: Vec<EnvironmentConfig>,
}

/// TTLs applied to stored idempotency records, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "default_high_risk_apply_ttl_secs")]
    pub high_risk_apply_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            high_risk_apply_ttl_secs: default_high_risk_apply_ttl_secs(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_audit_log_path() -> String {
    "./data/audit.log".to_string()
}

fn default_high_risk_apply_ttl_secs() -> u64 {
    15 * 60
}

fn default_ttl_secs() -> u64 {
    60 * 60
}

/// Loads and validates the configuration file.
pub fn load(path: &Path) -> anyhow::Result<AppConfig> {
    let raw = std::fs::read(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let cfg: AppConfig = serde_json::from_slice(&raw)
        .with_context(|| format!("parse config file {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen_addr.trim().is_empty() {
            anyhow::bail!("listen_addr is required");
        }
        if self.environments.is_empty() {
            anyhow::bail!("at least one environment is required");
        }
        for env in &self.environments {
            if env.name.trim().is_empty()
                || env.base_url.trim().is_empty()
                || env.token_id.trim().is_empty()
                || env.token_secret_env.trim().is_empty()
            {
                anyhow::bail!("invalid environment config for {:?}", env.name);
            }
        }
        if self.idempotency.high_risk_apply_ttl_secs == 0 || self.idempotency.default_ttl_secs == 0 {
            anyhow::bail!("idempotency TTLs must be greater than zero");
        }
        Ok(())
    }
}
