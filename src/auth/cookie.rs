use crate::security::url_validation::cookie_domain_allowed;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

/// Browser cookie as captured by the login flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix seconds. `<= 0` marks a session cookie.
    #[serde(default)]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

fn default_path() -> String {
    "/".into()
}

impl Cookie {
    /// Session cookie on `domain` with default attributes.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            expires: -1.0,
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
        }
    }

    #[must_use]
    pub fn with_expires(mut self, expires: f64) -> Self {
        self.expires = expires;
        self
    }

    pub fn is_session(&self) -> bool {
        self.expires <= 0.0
    }
}

/// Cookies whose domain is on the allow-list, in input order.
pub fn filter_allowed(cookies: Vec<Cookie>, allowed_domains: &[String]) -> Vec<Cookie> {
    cookies
        .into_iter()
        .filter(|c| cookie_domain_allowed(&c.domain, allowed_domains))
        .collect()
}

/// `Cookie` request header value.
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}
