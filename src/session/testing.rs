//! Network-free transport for tests.

use super::errors::SessionError;
use super::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, SessionError> + Send + Sync;

/// Answers every request with a closure and remembers what was asked.
#[derive(Clone)]
pub struct ScriptedTransport {
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, SessionError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// All requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Requests whose URL contains `needle`.
    pub fn requests_to(&self, needle: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains(needle))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        (self.handler)(&request)
    }
}

/// Splits an absolute URL into host and path-plus-query.
pub fn split_url(url: &str) -> (String, String) {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    match rest.find('/') {
        Some(idx) => {
            let (host, target) = rest.split_at(idx);
            (host.to_string(), target.to_string())
        }
        None => (rest.to_string(), "/".to_string()),
    }
}
