//! Single sign-on login ceremony.
//!
//! The site only exposes its API to a browser session that went through the
//! SSO form, so the flow drives two agents:
//! 1. An anonymous agent on the site reads the site id from the landing page.
//! 2. An agent on the login host fetches the form, picks up the CSRF token
//!    and posts the credentials.
//! 3. When the login agent lands on the success URL, the auth key from that
//!    URL is handed to the site agent as a cookie and the site agent finishes
//!    the server-side redirect. The site agent is the result.

use crate::observer::errors::{ObserverError, PageMarker};
use crate::observer::extract::PageExtractor;
use crate::observer::types::{Account, ObserverSettings};
use crate::session::{SessionAgent, Transport};
use std::sync::Arc;
use url::Url;

const LOGIN_FORM_PATH: &str = "/ssotele2/wap/auth";
const LOGIN_SUBMIT_PATH: &str = "/ssotele2/wap/auth/submitLoginAndPassword";
const ROUTE_REDIRECT_PATH: &str = "/api/route/redirect";
const SUCCESS_MARKER: &str = "successLogin";
pub const AUTH_COOKIE: &str = "t2-auth";

/// A site agent carrying an authenticated session.
pub struct AuthorizedSession {
    pub agent: SessionAgent,
    pub site_id: String,
}

/// Runs the login ceremony for one account.
pub async fn authenticate(
    account: &Account,
    settings: &ObserverSettings,
    transport: Arc<dyn Transport>,
    extractor: &dyn PageExtractor,
) -> Result<AuthorizedSession, ObserverError> {
    let mut site_agent = new_agent(&settings.site, settings, transport.clone());
    let landing = site_agent.navigate("/", &[]).await?;
    let site_id = match extractor.site_id(&landing.body) {
        Some(site_id) => site_id,
        None => {
            tracing::error!(
                fatal = true,
                marker = PageMarker::PreloadedState.as_str(),
                "No siteId found on landing page"
            );
            return Err(ObserverError::auth("unable to continue without siteId"));
        }
    };
    tracing::debug!(site_id = %site_id, "Resolved site id");

    let mut login_agent = new_agent(&settings.login_host, settings, transport)
        .with_referer(format!("https://{}/", settings.site));
    let service_id = settings.sso_service_id.to_string();
    let return_url = format!(
        "https://{}/api/auth/sso/successLogin?returnUrl=%2F",
        settings.site
    );
    let form = login_agent
        .navigate(
            LOGIN_FORM_PATH,
            &[("serviceId", service_id.as_str()), ("returnUrl", return_url.as_str())],
        )
        .await?;
    let csrf = extractor.csrf_token(&form.body).ok_or_else(|| {
        tracing::error!(marker = PageMarker::CsrfToken.as_str(), "No csrf token on login form");
        ObserverError::Extraction(PageMarker::CsrfToken)
    })?;

    let submitted = login_agent
        .post_form(
            LOGIN_SUBMIT_PATH,
            &[
                ("_csrf", csrf.as_str()),
                ("authBy", "BY_PASS"),
                ("rememberMe", "true"),
                ("pNumber", account.id.as_str()),
                ("password", account.password.as_str()),
            ],
        )
        .await?;

    let landed = login_agent.referer().unwrap_or_default().to_string();
    if !reached_success_page(&landed) {
        let message = match extractor.error_message(&submitted.body) {
            Some(message) => message,
            None => {
                tracing::error!(marker = PageMarker::ErrorText.as_str(), "No error text found");
                "login did not reach the success page".to_string()
            }
        };
        tracing::error!(reason = %message, "Login failed");
        return Err(ObserverError::auth(message));
    }

    tracing::debug!(return_url = %landed, "Login landed on success page");
    let (key, return_path) = success_params(&landed)?;
    tracing::info!("Logged in successfully");
    site_agent.cookies_mut().add(AUTH_COOKIE, &key);
    site_agent
        .navigate(
            ROUTE_REDIRECT_PATH,
            &[("path", return_path.as_str()), ("pageParams", "authorized=true")],
        )
        .await?;

    Ok(AuthorizedSession {
        agent: site_agent,
        site_id,
    })
}

fn new_agent(
    host: &str,
    settings: &ObserverSettings,
    transport: Arc<dyn Transport>,
) -> SessionAgent {
    SessionAgent::new(host, transport)
        .with_timeout(settings.request_timeout)
        .with_max_redirects(settings.max_redirects)
}

/// True when the last page the login agent loaded is the success endpoint.
///
/// Only the path counts: the login form's own URL carries the success URL
/// in its `returnUrl` query.
fn reached_success_page(landed: &str) -> bool {
    Url::parse(landed)
        .map(|url| url.path().contains(SUCCESS_MARKER))
        .unwrap_or(false)
}

/// Reads the auth key and return path from the success URL's query.
fn success_params(landed: &str) -> Result<(String, String), ObserverError> {
    let url = Url::parse(landed)
        .map_err(|e| ObserverError::auth(format!("unreadable success url: {}", e)))?;
    let mut key = None;
    let mut return_path = None;
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "key" => key = Some(value.into_owned()),
            "returnUrl" => return_path = Some(value.into_owned()),
            _ => {}
        }
    }
    let key = key.ok_or_else(|| ObserverError::auth("success url carries no auth key"))?;
    Ok((key, return_path.unwrap_or_else(|| "/".to_string())))
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
