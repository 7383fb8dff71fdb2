//! Scripted stand-in for the remote site used by observer tests.

use crate::observer::types::{Account, ObserverSettings};
use crate::session::testing::{split_url, ScriptedTransport};
use crate::session::transport::{HttpRequest, HttpResponse, Method};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SITE: &str = "site.test";
pub const LOGIN_HOST: &str = "login.test";
pub const SITE_ID: &str = "siteTEST";
pub const AUTH_KEY: &str = "auth-key-1";
pub const P_NUMBER: &str = "79000000001";

pub fn landing_page(site_id: &str) -> String {
    format!(
        "<html><head><script>window.__PRELOADED_STATE__ = {{\"app\":{{\"siteId\":\"{}\"}}}}</script></head></html>",
        site_id
    )
}

pub fn login_form(csrf: &str) -> String {
    format!(
        "<html><head><meta content=\"{}\" name=\"_csrf\"/></head><form></form></html>",
        csrf
    )
}

pub fn ok_envelope(data: &str) -> String {
    format!("{{\"meta\":{{\"status\":\"OK\"}},\"data\":{}}}", data)
}

pub fn error_envelope(message: &str) -> String {
    format!(
        "{{\"meta\":{{\"status\":\"ERROR\",\"message\":\"{}\"}}}}",
        message
    )
}

pub fn account() -> Account {
    Account::new(P_NUMBER, "secret")
}

pub fn settings() -> ObserverSettings {
    let mut settings = ObserverSettings::new(SITE);
    settings.login_host = LOGIN_HOST.to_string();
    settings.request_timeout = Duration::from_secs(1);
    settings
}

/// Mutable behaviour of the fake site.
pub struct SiteState {
    pub landing: String,
    pub login_form: String,
    pub login_succeeds: bool,
    /// Served in order; the last body repeats.
    pub services: VecDeque<String>,
    pub subscriptions: String,
    /// Delete responses keyed by `serv_id`; missing ids get an OK envelope.
    pub delete_failures: Vec<(String, String)>,
    pub landing_status: u16,
}

impl Default for SiteState {
    fn default() -> Self {
        Self {
            landing: landing_page(SITE_ID),
            login_form: login_form("csrf-1"),
            login_succeeds: true,
            services: VecDeque::from(vec![ok_envelope("[]")]),
            subscriptions: ok_envelope("[]"),
            delete_failures: Vec::new(),
            landing_status: 200,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeSite {
    pub state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, f: impl FnOnce(&mut SiteState)) {
        let mut state = self.state.lock().expect("site state lock");
        f(&mut state);
    }

    pub fn transport(&self) -> ScriptedTransport {
        let state = self.state.clone();
        ScriptedTransport::new(move |req| {
            let mut state = state.lock().expect("site state lock");
            Ok(respond(&mut state, req))
        })
    }
}

fn respond(state: &mut SiteState, req: &HttpRequest) -> HttpResponse {
    let (host, target) = split_url(&req.url);
    let path = target.split('?').next().unwrap_or_default().to_string();
    let services_path = format!("/api/subscribers/{}/{}/services", P_NUMBER, SITE_ID);
    let subscription_path = format!("/api/subscribers/{}/subscription", P_NUMBER);

    match (host.as_str(), path.as_str(), req.method) {
        (SITE, "/", Method::Get) => HttpResponse::new(state.landing_status, state.landing.clone()),
        (LOGIN_HOST, "/ssotele2/wap/auth", Method::Get) => {
            HttpResponse::new(200, state.login_form.clone())
        }
        (LOGIN_HOST, "/ssotele2/wap/auth/submitLoginAndPassword", Method::Post) => {
            if state.login_succeeds {
                HttpResponse::new(302, "").with_header(
                    "Location",
                    &format!(
                        "https://{}/api/auth/sso/successLogin?key={}&returnUrl=%2Fhome",
                        SITE, AUTH_KEY
                    ),
                )
            } else {
                HttpResponse::new(
                    200,
                    "<form><div class=\"error-text\">Wrong password</div></form>",
                )
            }
        }
        (SITE, "/api/auth/sso/successLogin", Method::Get) => HttpResponse::new(200, "welcome"),
        (SITE, "/api/route/redirect", Method::Get) => HttpResponse::new(200, "home"),
        (SITE, p, Method::Get) if p == services_path => {
            let body = if state.services.len() > 1 {
                state.services.pop_front().unwrap_or_default()
            } else {
                state.services.front().cloned().unwrap_or_default()
            };
            HttpResponse::new(200, body)
        }
        (SITE, p, Method::Get) if p == subscription_path => {
            HttpResponse::new(200, state.subscriptions.clone())
        }
        (SITE, p, Method::Delete) if p == subscription_path => {
            let failure = state
                .delete_failures
                .iter()
                .find(|(serv_id, _)| target.contains(&format!("serv_id={}", serv_id)))
                .map(|(_, body)| body.clone());
            HttpResponse::new(200, failure.unwrap_or_else(|| ok_envelope("null")))
        }
        _ => HttpResponse::new(404, "not found"),
    }
}
