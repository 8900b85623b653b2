//! Request authentication: CSRF token acquisition and the SAPISIDHASH header.
//!
//! The CSRF token is scraped from the application's landing page and cached
//! for a fixed TTL. Concurrent callers may both refetch after expiry; the last
//! writer wins, which is harmless.

use super::cookie::{Cookie, cookie_header};
use super::cookie_store::CookieStore;
use crate::config::{EndpointsConfig, TimeoutsConfig};
use crate::error::{NotebookError, Result};
use parking_lot::Mutex;
use regex::Regex;
use reqwest::Client;
use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER,
    USER_AGENT,
};
use sha1::{Digest, Sha1};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// Session secret cookie names, highest priority first.
const SECRET_COOKIE_NAMES: [&str; 3] = ["SAPISID", "__Secure-3PAPISID", "__Secure-1PAPISID"];

/// Token field patterns, tried in order.
const CSRF_PATTERNS: [&str; 3] = [
    r#"SNlM0e":"([^"]+)""#,
    r"SNlM0e\\x22:\\x22([^\\]+)\\x22",
    r#""SNlM0e"\s*:\s*"([^"]+)""#,
];

static CSRF_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CSRF_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Pages shorter than this are almost always a login interstitial.
const SHORT_PAGE_BYTES: usize = 1000;

struct CsrfToken {
    value: String,
    expires_at: Instant,
}

/// `{t}_{sha1_hex(t + " " + secret + " " + origin)}`.
pub fn sapisid_hash(secret: &str, origin: &str, timestamp: i64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{timestamp} {secret} {origin}").as_bytes());
    format!("{timestamp}_{}", hex::encode(hasher.finalize()))
}

/// Value of the highest-priority session secret cookie, if any.
pub fn find_secret_cookie(cookies: &[Cookie]) -> Option<&str> {
    SECRET_COOKIE_NAMES.iter().find_map(|name| {
        cookies
            .iter()
            .find(|c| c.name == *name && !c.value.is_empty())
            .map(|c| c.value.as_str())
    })
}

/// First token captured by the ordered patterns.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    CSRF_REGEXES
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn header_value(raw: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(raw)
        .map_err(|_| NotebookError::validation("Header value contains invalid characters"))
}

/// Produces authenticated header sets and CSRF tokens for one account.
pub struct TokenAuthority {
    store: Arc<CookieStore>,
    http: Client,
    endpoints: EndpointsConfig,
    csrf_ttl: Duration,
    fetch_timeout: Duration,
    csrf: Mutex<Option<CsrfToken>>,
}

impl TokenAuthority {
    pub fn new(
        store: Arc<CookieStore>,
        endpoints: EndpointsConfig,
        timeouts: &TimeoutsConfig,
    ) -> Self {
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            store,
            http,
            endpoints,
            csrf_ttl: timeouts.csrf_ttl(),
            fetch_timeout: timeouts.navigation(),
            csrf: Mutex::new(None),
        }
    }

    /// Shared HTTP client (no automatic redirects).
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn endpoints(&self) -> &EndpointsConfig {
        &self.endpoints
    }

    pub fn cookie_store(&self) -> &Arc<CookieStore> {
        &self.store
    }

    fn load_cookies(&self) -> Result<Vec<Cookie>> {
        let cookies = self.store.load()?;
        if cookies.is_empty() {
            return Err(NotebookError::auth(
                "No saved cookies. Run the login flow to authenticate.",
            ));
        }
        Ok(cookies)
    }

    /// Full header set for an authenticated POST.
    pub fn get_headers(&self) -> Result<HeaderMap> {
        let cookies = self.load_cookies()?;
        let origin = self.endpoints.origin();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        headers.insert(COOKIE, header_value(&cookie_header(&cookies))?);
        headers.insert(ORIGIN, header_value(origin)?);
        headers.insert(REFERER, header_value(&self.endpoints.referer())?);
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            HeaderName::from_static("x-same-domain"),
            HeaderValue::from_static("1"),
        );

        match find_secret_cookie(&cookies) {
            Some(secret) => {
                let hash = sapisid_hash(secret, origin, chrono::Utc::now().timestamp());
                headers.insert(
                    AUTHORIZATION,
                    header_value(&format!("SAPISIDHASH {hash}"))?,
                );
            }
            None => {
                tracing::warn!("No SAPISID cookie found; sending request without SAPISIDHASH");
            }
        }

        Ok(headers)
    }

    /// Cached CSRF token, refetched from the landing page once expired.
    pub async fn get_csrf_token(&self) -> Result<String> {
        if let Some(token) = self.csrf.lock().as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch_csrf_token().await?;
        *self.csrf.lock() = Some(CsrfToken {
            value: token.clone(),
            expires_at: Instant::now() + self.csrf_ttl,
        });
        Ok(token)
    }

    pub fn invalidate_csrf(&self) {
        self.csrf.lock().take();
        tracing::debug!("CSRF token invalidated");
    }

    async fn fetch_csrf_token(&self) -> Result<String> {
        let cookies = self.load_cookies()?;
        let url = self.endpoints.referer();
        tracing::debug!(%url, "Fetching CSRF token");

        let response = self
            .http
            .get(&url)
            .header(COOKIE, header_value(&cookie_header(&cookies))?)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotebookError::timeout("Timed out fetching CSRF token")
                } else {
                    NotebookError::Unexpected(anyhow::anyhow!("CSRF fetch failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = match status.as_u16() {
                302 | 303 => format!(
                    "Failed to fetch CSRF token: HTTP {} (Redirected, cookies may have expired)",
                    status.as_u16()
                ),
                code => format!("Failed to fetch CSRF token: HTTP {code}"),
            };
            return Err(NotebookError::auth(message));
        }

        let html = response
            .text()
            .await
            .map_err(|e| NotebookError::Unexpected(anyhow::anyhow!("CSRF page read failed: {e}")))?;

        if let Some(token) = extract_csrf_token(&html) {
            return Ok(token);
        }

        tracing::error!(
            page_length = html.len(),
            has_wiz_global_data = html.contains("WIZ_global_data"),
            has_snlm0e = html.contains("SNlM0e"),
            "CSRF token not found in page"
        );
        if html.len() < SHORT_PAGE_BYTES {
            tracing::warn!("Page is very short; likely a login redirect or error page");
        }
        Err(NotebookError::auth(
            "Could not extract CSRF token. Cookies may have expired; log in again.",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sapisid_hash_matches_known_vector() {
        let got = sapisid_hash("secret-value", "https://notebooklm.google.com", 1_700_000_000);
        assert_eq!(got, "1700000000_502dcf6c4e4619b14686dd944b95a90e4b1f2528");
    }

    #[test]
    fn secret_cookie_priority_order() {
        let cookies = vec![
            Cookie::new("__Secure-1PAPISID", "one", ".google.com"),
            Cookie::new("__Secure-3PAPISID", "three", ".google.com"),
        ];
        assert_eq!(find_secret_cookie(&cookies), Some("three"));

        let mut with_primary = cookies.clone();
        with_primary.push(Cookie::new("SAPISID", "primary", ".google.com"));
        assert_eq!(find_secret_cookie(&with_primary), Some("primary"));

        assert_eq!(find_secret_cookie(&[Cookie::new("SID", "x", ".google.com")]), None);
    }

    #[test]
    fn csrf_patterns_in_order() {
        assert_eq!(
            extract_csrf_token(r#"<script>WIZ_global_data = {"SNlM0e":"tok123","x":1}</script>"#)
                .as_deref(),
            Some("tok123")
        );
        assert_eq!(
            extract_csrf_token(r"var d='SNlM0e\x22:\x22escaped_tok\x22';").as_deref(),
            Some("escaped_tok")
        );
        assert_eq!(
            extract_csrf_token(r#"{"SNlM0e" : "spaced"}"#).as_deref(),
            Some("spaced")
        );
        assert_eq!(extract_csrf_token("<html>login</html>"), None);
    }

    #[test]
    fn all_csrf_patterns_compile() {
        assert_eq!(CSRF_REGEXES.len(), CSRF_PATTERNS.len());
    }
}
