//! Remote state checks run on every polling tick.

use crate::observer::auth::AuthorizedSession;
use crate::observer::envelope::{
    self, ServiceBaseline, ServiceChange, ServiceItem, SubscriptionItem,
};
use crate::observer::errors::ObserverError;
use crate::observer::types::AccountId;
use crate::session::SessionAgent;

/// What to do with subscriptions found on the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPolicy {
    /// Cancel every subscription found.
    Remove,
    /// Only log them.
    ReportOnly,
}

impl SubscriptionPolicy {
    pub fn from_flag(remove: bool) -> Self {
        if remove {
            Self::Remove
        } else {
            Self::ReportOnly
        }
    }
}

/// Result of one subscription check.
#[derive(Debug, Default)]
pub struct SubscriptionOutcome {
    pub found: Vec<SubscriptionItem>,
    pub removed: usize,
    /// Per-subscription removal failures; the rest of the list was still processed.
    pub failures: Vec<ObserverError>,
}

/// Polls one authenticated account.
pub struct AccountMonitor {
    account: AccountId,
    site_id: String,
    agent: SessionAgent,
    baseline: ServiceBaseline,
    policy: SubscriptionPolicy,
}

impl AccountMonitor {
    pub fn new(
        account: AccountId,
        session: AuthorizedSession,
        policy: SubscriptionPolicy,
    ) -> Self {
        Self {
            account,
            site_id: session.site_id,
            agent: session.agent,
            baseline: ServiceBaseline::new(),
            policy,
        }
    }

    #[cfg(test)]
    pub fn baseline(&self) -> &ServiceBaseline {
        &self.baseline
    }

    /// Runs the service check then the subscription check.
    ///
    /// A failing check aborts the tick. Removal failures of single
    /// subscriptions are returned instead.
    pub async fn tick(&mut self) -> Result<Vec<ObserverError>, ObserverError> {
        self.check_services().await?;
        let outcome = self.check_subscriptions().await?;
        tracing::debug!(
            found = outcome.found.len(),
            removed = outcome.removed,
            failed = outcome.failures.len(),
            "Tick finished"
        );
        Ok(outcome.failures)
    }

    pub async fn check_services(&mut self) -> Result<ServiceChange, ObserverError> {
        tracing::info!("Checking services");
        let path = format!(
            "/api/subscribers/{}/{}/services",
            self.account, self.site_id
        );
        let response = self
            .agent
            .xhr_get(&path, &[("status", "connected")], None)
            .await?;
        let current: Vec<ServiceItem> = envelope::decode_list(&response.body)?;

        let change = self.baseline.observe(current);
        match &change {
            ServiceChange::Baseline(services) => {
                for s in services {
                    tracing::info!(service = %s.name, abonent_fee = ?s.abonent_fee, "Connected service");
                }
            }
            ServiceChange::Appeared(new) if new.is_empty() => {
                tracing::info!("No new services");
            }
            ServiceChange::Appeared(new) => {
                tracing::warn!(count = new.len(), "New services found");
                for s in new {
                    tracing::warn!(
                        service = %s.name,
                        billing_id = %s.billing_id,
                        abonent_fee = ?s.abonent_fee,
                        "New service"
                    );
                }
            }
        }
        Ok(change)
    }

    pub async fn check_subscriptions(&mut self) -> Result<SubscriptionOutcome, ObserverError> {
        tracing::info!("Checking subscriptions");
        let path = self.subscription_path();
        let response = self.agent.xhr_get(&path, &[], None).await?;
        let found: Vec<SubscriptionItem> = envelope::decode_list(&response.body)?;

        if found.is_empty() {
            tracing::info!("No subscriptions");
        }

        let mut outcome = SubscriptionOutcome::default();
        for s in &found {
            tracing::warn!(
                subscription = %s.name,
                cost = s.cost.as_deref().unwrap_or("?"),
                period = s.period.as_deref().unwrap_or("?"),
                "Subscription found"
            );
            if self.policy == SubscriptionPolicy::ReportOnly {
                continue;
            }
            match self.remove_subscription(s).await {
                Ok(()) => {
                    tracing::info!(subscription = %s.name, "Subscription removed");
                    outcome.removed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        subscription = %s.name,
                        error = %e,
                        "Unable to remove subscription"
                    );
                    outcome.failures.push(e);
                }
            }
        }
        outcome.found = found;
        Ok(outcome)
    }

    async fn remove_subscription(&mut self, s: &SubscriptionItem) -> Result<(), ObserverError> {
        tracing::info!(subscription = %s.name, "Removing subscription");
        let path = self.subscription_path();
        let response = self
            .agent
            .xhr_delete(
                &path,
                &[("prov_id", s.prov_id.as_str()), ("serv_id", s.serv_id.as_str())],
                None,
            )
            .await?;
        envelope::open(&response.body)?;
        Ok(())
    }

    fn subscription_path(&self) -> String {
        format!("/api/subscribers/{}/subscription", self.account)
    }
}

#[cfg(test)]
#[path = "tests/checks_tests.rs"]
mod tests;
