//! HTTP transport used by session agents.
//!
//! The agent owns all browser-like behaviour (cookies, referer, redirects);
//! a transport only moves one request over the wire and hands back the raw
//! status, headers and body.

use super::errors::{SessionError, TransportKind};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// A fully prepared request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL including query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Returns the first header with the given name (case-insensitive).
    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased; repeated headers appear once per value.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    #[cfg(test)]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[cfg(test)]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }

    pub fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let name = name.to_string();
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(&name))
            .map(|(_, v)| v.as_str())
    }
}

/// Moves a single request over the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, SessionError>;
}

/// Production transport backed by blocking `ureq` calls on the blocking pool.
///
/// A fresh agent is configured per request so each call carries its own
/// timeout. Redirects and status codes are left to the session agent.
#[derive(Debug, Clone, Default)]
pub struct UreqTransport;

impl UreqTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        tokio::task::spawn_blocking(move || execute_blocking(request))
            .await
            .map_err(|e| SessionError::transport(TransportKind::Io, e.to_string()))?
    }
}

fn execute_blocking(request: HttpRequest) -> Result<HttpResponse, SessionError> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(request.timeout))
        .http_status_as_error(false)
        .max_redirects(0)
        .build()
        .into();

    let result = match request.method {
        Method::Get | Method::Delete => {
            let mut builder = if request.method == Method::Get {
                agent.get(request.url.as_str())
            } else {
                agent.delete(request.url.as_str())
            };
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.call()
        }
        Method::Post => {
            let mut builder = agent.post(request.url.as_str());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.send(request.body.as_deref().unwrap_or_default())
        }
    };

    let mut response = result.map_err(map_ureq_error)?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| SessionError::transport(TransportKind::Io, e.to_string()))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn map_ureq_error(err: ureq::Error) -> SessionError {
    let kind = match &err {
        ureq::Error::Timeout(_) => TransportKind::Timeout,
        ureq::Error::Io(_) => TransportKind::Io,
        _ => TransportKind::Connection,
    };
    SessionError::transport(kind, err.to_string())
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
