//! JSON API envelope and the snapshots built from it.
//!
//! Every API endpoint answers `{ meta: { status, message }, data }`. A
//! `status` of `"ERROR"` is a domain failure regardless of the HTTP status.

use crate::observer::errors::ObserverError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

const STATUS_ERROR: &str = "ERROR";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Checks the envelope of `body` and returns its raw `data` payload.
pub fn open(body: &str) -> Result<Option<serde_json::Value>, ObserverError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| ObserverError::decode(e.to_string()))?;
    if envelope.meta.status.as_deref() == Some(STATUS_ERROR) {
        tracing::debug!(content = body, "Remote error envelope");
        let message = envelope
            .meta
            .message
            .unwrap_or_else(|| "remote reported an error".to_string());
        return Err(ObserverError::remote(message));
    }
    Ok(envelope.data)
}

/// Decodes the `data` list of an envelope. A missing or null list is empty.
pub fn decode_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, ObserverError> {
    match open(body)? {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(data) => {
            serde_json::from_value(data).map_err(|e| ObserverError::decode(e.to_string()))
        }
    }
}

/// A connected service as listed by the services endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceItem {
    #[serde(deserialize_with = "text_or_number")]
    pub billing_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "optional_text_or_number")]
    pub abonent_fee: Option<String>,
}

/// A paid subscription as listed by the subscription endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "text_or_number")]
    pub prov_id: String,
    #[serde(deserialize_with = "text_or_number")]
    pub serv_id: String,
    #[serde(default, deserialize_with = "optional_text_or_number")]
    pub cost: Option<String>,
    #[serde(default, deserialize_with = "optional_text_or_number")]
    pub period: Option<String>,
}

/// Outcome of comparing a fresh services list with the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceChange {
    /// No earlier snapshot existed; the list became the baseline.
    Baseline(Vec<ServiceItem>),
    /// Services whose billing id was absent from the previous snapshot.
    Appeared(Vec<ServiceItem>),
}

/// Last known list of connected services for one account.
#[derive(Debug, Clone, Default)]
pub struct ServiceBaseline {
    previous: Option<Vec<ServiceItem>>,
}

impl ServiceBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_established(&self) -> bool {
        self.previous.is_some()
    }

    /// Diffs `current` against the stored snapshot by billing id, then stores it.
    pub fn observe(&mut self, current: Vec<ServiceItem>) -> ServiceChange {
        let change = match &self.previous {
            None => ServiceChange::Baseline(current.clone()),
            Some(previous) => {
                let known: HashSet<&str> =
                    previous.iter().map(|s| s.billing_id.as_str()).collect();
                ServiceChange::Appeared(
                    current
                        .iter()
                        .filter(|s| !known.contains(s.billing_id.as_str()))
                        .cloned()
                        .collect(),
                )
            }
        };
        self.previous = Some(current);
        change
    }
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    scalar_text(value).ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}

fn optional_text_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(scalar_text(value))
}

fn scalar_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/envelope_tests.rs"]
mod tests;
