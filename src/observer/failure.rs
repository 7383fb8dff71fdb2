//! Failure bookkeeping and the restart policy derived from it.
//!
//! Failures are counted per account inside a rolling window: a failure that
//! arrives more than `fail_threshold` after the previous one starts the count
//! over at 1. Each restart waits `restart_base_delay × count`, and an account
//! whose count exceeds `fail_max_count` is abandoned.

use crate::observer::types::ObserverSettings;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Rolling failure count for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureRecord {
    last_failure: Option<DateTime<Utc>>,
    count: u32,
}

impl FailureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    #[cfg(test)]
    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.last_failure
    }

    /// Records a failure at `now` and returns the updated count.
    pub fn register_at(&mut self, now: DateTime<Utc>, threshold: Duration) -> u32 {
        let window_expired = match self.last_failure {
            None => true,
            // A clock that moved backwards keeps the current window.
            Some(last) => (now - last)
                .to_std()
                .map(|gap| gap > threshold)
                .unwrap_or(false),
        };
        self.count = if window_expired {
            1
        } else {
            self.count.saturating_add(1)
        };
        self.last_failure = Some(now);
        self.count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Start a new worker after `delay`.
    Restart { attempt: u32, delay: Duration },
    /// Stop retrying the account for the rest of the process lifetime.
    Abandon { failures: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub fail_threshold: Duration,
    pub fail_max_count: u32,
    pub base_delay: Duration,
}

impl RestartPolicy {
    pub fn from_settings(settings: &ObserverSettings) -> Self {
        Self {
            fail_threshold: settings.fail_threshold,
            fail_max_count: settings.fail_max_count,
            base_delay: settings.restart_base_delay,
        }
    }

    /// Registers a failure on `record` and decides what happens next.
    pub fn on_failure(&self, record: &mut FailureRecord, now: DateTime<Utc>) -> RestartDecision {
        let count = record.register_at(now, self.fail_threshold);
        if count <= self.fail_max_count {
            RestartDecision::Restart {
                attempt: count,
                delay: self.base_delay.saturating_mul(count),
            }
        } else {
            RestartDecision::Abandon { failures: count }
        }
    }
}

#[cfg(test)]
#[path = "tests/failure_tests.rs"]
mod tests;
