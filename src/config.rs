use crate::observer::types::{
    Account, ObserverSettings, DEFAULT_FAIL_MAX_COUNT, DEFAULT_FAIL_THRESHOLD, DEFAULT_LOGIN_HOST,
    DEFAULT_POLLING_PERIOD, DEFAULT_REMOVE_SUBSCRIPTIONS, DEFAULT_RESTART_BASE_DELAY,
    DEFAULT_SSO_SERVICE_ID,
};
use crate::session::agent::{DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Daemon configuration as read from disk. Durations are in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Host of the regional self-service site, e.g. `chelyabinsk.tele2.ru`.
    pub site: String,
    #[serde(default = "default_login_host")]
    pub login_host: String,
    #[serde(default = "default_sso_service_id")]
    pub sso_service_id: u32,
    #[serde(default = "default_polling_period")]
    pub polling_period: u64,
    /// Failures further apart than this start a fresh count.
    #[serde(default = "default_fail_treshold", alias = "failThreshold")]
    pub fail_treshold: u64,
    #[serde(default = "default_fail_max_count")]
    pub fail_max_count: u32,
    /// Base restart delay, multiplied by the current failure count.
    #[serde(default = "default_observer_restart_timeout")]
    pub observer_restart_timeout: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    /// When false, subscriptions are reported but never cancelled.
    #[serde(default = "default_remove_subscriptions")]
    pub remove_subscriptions: bool,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountConfig {
    pub p_number: String,
    pub password: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("p_number", &self.p_number)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_login_host() -> String {
    DEFAULT_LOGIN_HOST.to_string()
}

fn default_sso_service_id() -> u32 {
    DEFAULT_SSO_SERVICE_ID
}

fn default_polling_period() -> u64 {
    millis(DEFAULT_POLLING_PERIOD)
}

fn default_fail_treshold() -> u64 {
    millis(DEFAULT_FAIL_THRESHOLD)
}

fn default_fail_max_count() -> u32 {
    DEFAULT_FAIL_MAX_COUNT
}

fn default_observer_restart_timeout() -> u64 {
    millis(DEFAULT_RESTART_BASE_DELAY)
}

fn default_request_timeout() -> u64 {
    millis(DEFAULT_TIMEOUT)
}

fn default_max_redirects() -> u32 {
    DEFAULT_MAX_REDIRECTS
}

fn default_remove_subscriptions() -> bool {
    DEFAULT_REMOVE_SUBSCRIPTIONS
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// On-disk syntax, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.yaml` and `.yml` are YAML; anything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content, ConfigFormat::from_path(path))
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config: Self = match format {
            ConfigFormat::Json => {
                serde_json::from_str(content).context("Failed to parse config as JSON")?
            }
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).context("Failed to parse config as YAML")?
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.site.trim().is_empty() {
            anyhow::bail!("'site' must name the self-service host");
        }
        if self.site.contains("://") || self.site.contains('/') {
            anyhow::bail!(
                "'site' must be a bare host name without scheme or path, got '{}'",
                self.site
            );
        }
        if self.login_host.trim().is_empty() {
            anyhow::bail!("'loginHost' must not be empty");
        }
        if self.polling_period == 0 {
            anyhow::bail!("'pollingPeriod' must be greater than zero");
        }
        if self.request_timeout == 0 {
            anyhow::bail!("'requestTimeout' must be greater than zero");
        }
        if self.max_redirects == 0 {
            anyhow::bail!("'maxRedirects' must be at least 1");
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            let id = account.p_number.trim();
            if id.is_empty() {
                anyhow::bail!("Account with empty 'pNumber'");
            }
            if !seen.insert(id) {
                anyhow::bail!("Account '{}' is configured more than once", id);
            }
        }
        if self.accounts.is_empty() {
            tracing::warn!("No accounts configured");
        }

        Ok(())
    }

    pub fn observer_settings(&self) -> ObserverSettings {
        ObserverSettings {
            site: self.site.trim().to_string(),
            login_host: self.login_host.trim().to_string(),
            sso_service_id: self.sso_service_id,
            polling_period: Duration::from_millis(self.polling_period),
            fail_threshold: Duration::from_millis(self.fail_treshold),
            fail_max_count: self.fail_max_count,
            restart_base_delay: Duration::from_millis(self.observer_restart_timeout),
            request_timeout: Duration::from_millis(self.request_timeout),
            max_redirects: self.max_redirects,
            remove_subscriptions: self.remove_subscriptions,
        }
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|a| Account::new(&a.p_number, &a.password))
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
