//! Text extraction from the site's server-rendered pages.
//!
//! Everything that depends on the remote markup lives here, behind
//! [`PageExtractor`], so the login ceremony can run against fixture pages.

use regex::Regex;

/// Pulls the values the login ceremony needs out of HTML pages.
///
/// Every method returns `None` when its marker is missing so callers can
/// attribute the failure to one specific page element.
pub trait PageExtractor: Send + Sync {
    /// Site identifier from the preloaded state blob on the landing page.
    fn site_id(&self, html: &str) -> Option<String>;
    /// CSRF token from the login form page.
    fn csrf_token(&self, html: &str) -> Option<String>;
    /// Human readable message from a failed login page.
    fn error_message(&self, html: &str) -> Option<String>;
}

/// Regex-based extractor for the current site markup.
#[derive(Debug, Clone)]
pub struct SiteMarkup {
    preloaded_state: Regex,
    csrf_meta: Regex,
    meta_content: Regex,
    error_text: Regex,
}

impl SiteMarkup {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            preloaded_state: Regex::new(r"window\.__PRELOADED_STATE__\s*=\s*(\{.*\})")?,
            csrf_meta: Regex::new(r#"(<meta[^<>]*name="_csrf"[^<>]*/>)"#)?,
            meta_content: Regex::new(r#"content="([^"]*)""#)?,
            error_text: Regex::new(r#"<div class="error-text">([^<>].*)</div>"#)?,
        })
    }
}

impl PageExtractor for SiteMarkup {
    fn site_id(&self, html: &str) -> Option<String> {
        let blob = self.preloaded_state.captures(html)?.get(1)?.as_str();
        let state: serde_json::Value = match serde_json::from_str(blob) {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(error = %e, "Preloaded state is not valid JSON");
                return None;
            }
        };
        match state.pointer("/app/siteId")? {
            serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
            serde_json::Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    fn csrf_token(&self, html: &str) -> Option<String> {
        let meta = self.csrf_meta.captures(html)?.get(1)?.as_str();
        let content = self.meta_content.captures(meta)?.get(1)?;
        Some(content.as_str().to_string())
    }

    fn error_message(&self, html: &str) -> Option<String> {
        let text = self.error_text.captures(html)?.get(1)?;
        Some(text.as_str().trim().to_string())
    }
}

#[cfg(test)]
#[path = "tests/extract_tests.rs"]
mod tests;
