//! Account and runtime settings types shared by workers and the supervisor.

use std::time::Duration;

/// Phone number identifying an account; unique key across the process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(p_number: &str) -> Self {
        Self(p_number.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credentials for one tracked account.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub password: String,
}

impl Account {
    pub fn new(p_number: &str, password: &str) -> Self {
        Self {
            id: AccountId::new(p_number),
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub const DEFAULT_LOGIN_HOST: &str = "login.tele2.ru";
pub const DEFAULT_SSO_SERVICE_ID: u32 = 681;
pub const DEFAULT_POLLING_PERIOD: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FAIL_THRESHOLD: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_FAIL_MAX_COUNT: u32 = 3;
pub const DEFAULT_RESTART_BASE_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_REMOVE_SUBSCRIPTIONS: bool = true;

/// Runtime settings for the observer population, with durations resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverSettings {
    /// Host of the self-service site, e.g. `chelyabinsk.tele2.ru`.
    pub site: String,
    /// Host serving the single sign-on login form.
    pub login_host: String,
    pub sso_service_id: u32,
    pub polling_period: Duration,
    /// Failures further apart than this start a fresh count.
    pub fail_threshold: Duration,
    /// Restarts allowed within one failure window before an account is abandoned.
    pub fail_max_count: u32,
    /// Base delay multiplied by the failure count before a restart.
    pub restart_base_delay: Duration,
    pub request_timeout: Duration,
    pub max_redirects: u32,
    /// When false, subscriptions are only reported, never cancelled.
    pub remove_subscriptions: bool,
}

impl ObserverSettings {
    #[cfg(test)]
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            login_host: DEFAULT_LOGIN_HOST.to_string(),
            sso_service_id: DEFAULT_SSO_SERVICE_ID,
            polling_period: DEFAULT_POLLING_PERIOD,
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
            fail_max_count: DEFAULT_FAIL_MAX_COUNT,
            restart_base_delay: DEFAULT_RESTART_BASE_DELAY,
            request_timeout: crate::session::agent::DEFAULT_TIMEOUT,
            max_redirects: crate::session::agent::DEFAULT_MAX_REDIRECTS,
            remove_subscriptions: DEFAULT_REMOVE_SUBSCRIPTIONS,
        }
    }
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
