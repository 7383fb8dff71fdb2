//! Session cookie jar for one browser-like actor.
//!
//! Cookies are keyed by name only. There is no expiry, domain or path handling:
//! the jar belongs to a single agent talking to a single logical site, and the
//! last `Set-Cookie` for a name wins.

/// Value of a cookie attribute such as `Path=/` or a bare flag like `HttpOnly`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Flag,
}

/// A single cookie as received in a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    /// `None` when the header had no `=` after the name.
    pub value: Option<String>,
    /// Attributes in the order they appeared; a repeated key keeps the last value.
    pub attributes: Vec<(String, AttributeValue)>,
}

impl Cookie {
    /// Creates a cookie without attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            attributes: Vec::new(),
        }
    }

    /// Parses one raw `Set-Cookie` header value.
    ///
    /// Parsing is naive: `name=value` followed by `;`-separated
    /// attributes. Nothing is rejected.
    pub fn parse(raw: &str) -> Self {
        let mut items = raw.split(';');
        let first = items.next().unwrap_or_default();
        let (name, value) = match first.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (first.to_string(), None),
        };

        let mut attributes: Vec<(String, AttributeValue)> = Vec::new();
        for item in items {
            let item = item.strip_prefix(' ').unwrap_or(item);
            let (key, value) = match item.split_once('=') {
                Some((key, value)) if !value.is_empty() => {
                    (key, AttributeValue::Text(value.to_string()))
                }
                Some((key, _)) => (key, AttributeValue::Flag),
                None => (item, AttributeValue::Flag),
            };
            match attributes.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value,
                None => attributes.push((key.to_string(), value)),
            }
        }

        Self {
            name,
            value,
            attributes,
        }
    }

    /// Looks up an attribute by its exact key.
    #[cfg(test)]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Attributes rendered back in `Set-Cookie` form, for diagnostics.
    fn attributes_line(&self) -> String {
        self.attributes
            .iter()
            .map(|(key, value)| match value {
                AttributeValue::Text(text) => format!("{}={}", key, text),
                AttributeValue::Flag => key.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn pair(&self) -> String {
        format!("{}={}", self.name, self.value.as_deref().unwrap_or_default())
    }
}

/// Ordered cookie collection owned by one session agent.
#[derive(Debug, Clone, Default)]
pub struct CookieStore {
    cookies: Vec<Cookie>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a cookie obtained outside of a `Set-Cookie` header.
    pub fn add(&mut self, name: &str, value: &str) {
        self.upsert(Cookie::new(name, value));
    }

    /// Stores the cookie carried by one raw `Set-Cookie` header value.
    pub fn set(&mut self, raw_header: &str) {
        let cookie = Cookie::parse(raw_header);
        tracing::trace!(
            target: "http",
            name = %cookie.name,
            attributes = %cookie.attributes_line(),
            "Cookie stored"
        );
        self.upsert(cookie);
    }

    /// Stores every cookie from a list of raw `Set-Cookie` header values.
    pub fn set_all<'a, I>(&mut self, raw_headers: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for raw in raw_headers {
            self.set(raw);
        }
    }

    /// Serialises the jar into a single `Cookie` request header value.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(Cookie::pair)
            .collect::<Vec<_>>()
            .join("; ")
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    fn upsert(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }
}

#[cfg(test)]
#[path = "tests/cookies_tests.rs"]
mod tests;
