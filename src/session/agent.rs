//! Browser-like HTTP session against one host.
//!
//! A [`SessionAgent`] replays what a browser tab does: it carries cookies
//! between requests, sends the last visited page as `Referer`, and follows
//! redirects on page navigations. Background data calls (`xhr_*`) do neither
//! of the latter two.

use super::cookies::CookieStore;
use super::errors::SessionError;
use super::transport::{HttpRequest, HttpResponse, Method, Transport};
use std::sync::Arc;
use std::time::Duration;
use url::form_urlencoded;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Accept header used by xhr calls when the caller supplies none.
pub const XHR_ACCEPT: &str = "application/json, text/plain, */*";

const SCHEME: &str = "https";

const BASE_HEADERS: [(&str, &str); 5] = [
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3",
    ),
    ("Accept-Language", "en,he;q=0.9,ru;q=0.8,en-US;q=0.7"),
    ("Connection", "keep-alive"),
    ("DNT", "1"),
    (
        "User-Agent",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/78.0.3904.108 Safari/537.36",
    ),
];

/// Query or form fields, in the order they are sent.
pub type Fields<'a> = [(&'a str, &'a str)];

pub struct SessionAgent {
    host: String,
    referer: Option<String>,
    timeout: Duration,
    max_redirects: u32,
    cookies: CookieStore,
    transport: Arc<dyn Transport>,
}

impl SessionAgent {
    /// Creates an agent with an empty cookie jar and no referer.
    pub fn new(host: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            host: host.into(),
            referer: None,
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            cookies: CookieStore::new(),
            transport,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[cfg(test)]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// URL of the last page navigation that completed.
    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }

    #[cfg(test)]
    pub fn cookies(&self) -> &CookieStore {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut CookieStore {
        &mut self.cookies
    }

    /// Loads a page, following 302/307 redirects.
    pub async fn navigate(
        &mut self,
        path: &str,
        query: &Fields<'_>,
    ) -> Result<HttpResponse, SessionError> {
        let target = with_query(path, query);
        let response = self.exchange(Method::Get, &target, &[], None, false).await?;
        self.follow_redirects(response).await
    }

    /// Submits a url-encoded form, following 302/307 redirects with GET.
    pub async fn post_form(
        &mut self,
        path: &str,
        form: &Fields<'_>,
    ) -> Result<HttpResponse, SessionError> {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form.iter())
            .finish();
        let response = self
            .exchange(
                Method::Post,
                path,
                &[("Content-Type", "application/x-www-form-urlencoded")],
                Some(body),
                false,
            )
            .await?;
        self.follow_redirects(response).await
    }

    /// Background GET; anything but 200 is an error.
    pub async fn xhr_get(
        &mut self,
        path: &str,
        query: &Fields<'_>,
        accept: Option<&str>,
    ) -> Result<HttpResponse, SessionError> {
        self.xhr(Method::Get, path, query, accept).await
    }

    /// Background DELETE; anything but 200 is an error.
    pub async fn xhr_delete(
        &mut self,
        path: &str,
        query: &Fields<'_>,
        accept: Option<&str>,
    ) -> Result<HttpResponse, SessionError> {
        self.xhr(Method::Delete, path, query, accept).await
    }

    async fn xhr(
        &mut self,
        method: Method,
        path: &str,
        query: &Fields<'_>,
        accept: Option<&str>,
    ) -> Result<HttpResponse, SessionError> {
        let target = with_query(path, query);
        let accept = accept.unwrap_or(XHR_ACCEPT);
        let response = self
            .exchange(method, &target, &[("Accept", accept)], None, true)
            .await?;
        if response.status != 200 {
            tracing::debug!(target: "http", status = response.status, body = %response.body, "Erroneous response");
            return Err(SessionError::protocol(
                Some(response.status),
                format!("xhr {} {} failed", method.as_str(), path),
            ));
        }
        Ok(response)
    }

    async fn follow_redirects(
        &mut self,
        mut response: HttpResponse,
    ) -> Result<HttpResponse, SessionError> {
        let mut hops = 0u32;
        while is_redirect(response.status) {
            if hops >= self.max_redirects {
                return Err(SessionError::protocol(
                    Some(response.status),
                    format!("more than {} redirects", self.max_redirects),
                ));
            }
            let location = response.header("location").ok_or_else(|| {
                SessionError::protocol(Some(response.status), "redirect without Location header")
            })?;
            let (host, target) = resolve_location(&self.host, location)?;
            tracing::debug!(target: "http", location, "redirecting");
            self.host = host;
            response = self.exchange(Method::Get, &target, &[], None, false).await?;
            hops += 1;
        }
        Ok(response)
    }

    async fn exchange(
        &mut self,
        method: Method,
        target: &str,
        overrides: &Fields<'_>,
        body: Option<String>,
        xhr: bool,
    ) -> Result<HttpResponse, SessionError> {
        let url = format!("{}://{}{}", SCHEME, self.host, target);
        let mut headers = merge_headers(overrides);
        if let Some(referer) = &self.referer {
            headers.push(("Referer".to_string(), referer.clone()));
        }
        if !self.cookies.is_empty() {
            headers.push(("Cookie".to_string(), self.cookies.header_value()));
        }

        tracing::debug!(target: "http", method = method.as_str(), path = target, xhr, "Request");
        tracing::trace!(target: "http", ?headers, "Request headers");

        let request = HttpRequest {
            method,
            url: url.clone(),
            headers,
            body,
            timeout: self.timeout,
        };
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(target: "http", error = %e, timeout = e.is_timeout(), "Request failed");
                return Err(e);
            }
        };

        self.cookies.set_all(response.header_values("set-cookie"));
        if !xhr && method == Method::Get {
            self.referer = Some(url);
        }

        tracing::debug!(target: "http", status = response.status, "Response");
        tracing::trace!(target: "http", headers = ?response.headers, body = %response.body, "Response content");
        Ok(response)
    }
}

fn is_redirect(status: u16) -> bool {
    status == 302 || status == 307
}

/// Base headers with per-request overrides applied by case-insensitive name.
fn merge_headers(overrides: &Fields<'_>) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = BASE_HEADERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (name, value) in overrides {
        match headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.1 = value.to_string(),
            None => headers.push((name.to_string(), value.to_string())),
        }
    }
    headers
}

fn with_query(path: &str, query: &Fields<'_>) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter())
        .finish();
    format!("{}?{}", path, encoded)
}

/// Resolves a `Location` header against the current host.
///
/// Returns the host to switch to and the path-plus-query to request there.
fn resolve_location(current_host: &str, location: &str) -> Result<(String, String), SessionError> {
    let base = Url::parse(&format!("{}://{}/", SCHEME, current_host))
        .map_err(|e| SessionError::protocol(None, format!("invalid host {}: {}", current_host, e)))?;
    let url = base
        .join(location)
        .map_err(|e| SessionError::protocol(None, format!("invalid redirect {}: {}", location, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| SessionError::protocol(None, format!("redirect without host: {}", location)))?;
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let target = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    Ok((host, target))
}

#[cfg(test)]
#[path = "tests/agent_tests.rs"]
mod tests;
