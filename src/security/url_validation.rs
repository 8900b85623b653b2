//! Domain and URL checks for cookies and notebook links.

use crate::error::{NotebookError, Result};

/// Lowercase, trimmed, dot-prefixed form so `example.com` and `.example.com`
/// compare equal.
pub fn normalize_cookie_domain(raw: &str) -> Option<String> {
    let d = raw.trim().trim_start_matches('.').trim_end_matches('.');
    if d.is_empty() || d.chars().any(char::is_whitespace) {
        return None;
    }
    Some(format!(".{}", d.to_lowercase()))
}

/// True if `domain` equals or is a subdomain of any allow-listed entry.
///
/// Matching happens on the dot-prefixed form, so `evilgoogle.com` does not
/// match `google.com`.
pub fn cookie_domain_allowed(domain: &str, allowed_domains: &[String]) -> bool {
    let Some(domain) = normalize_cookie_domain(domain) else {
        return false;
    };
    allowed_domains
        .iter()
        .filter_map(|allowed| normalize_cookie_domain(allowed))
        .any(|allowed| domain == allowed || domain.ends_with(&allowed))
}

/// Extract the lowercase host from an `http://` or `https://` URL.
///
/// Rejects userinfo (`@`) and empty hosts.
pub fn extract_host(url: &str) -> Result<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| NotebookError::validation("Only http:// and https:// URLs are allowed"))?;

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err(NotebookError::validation("URL must include a host"));
    }
    if authority.contains('@') {
        return Err(NotebookError::validation("URL userinfo is not allowed"));
    }

    let host = authority
        .split(':')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches('.')
        .to_lowercase();
    if host.is_empty() {
        return Err(NotebookError::validation("URL must include a valid host"));
    }
    Ok(host)
}

/// Accept only https links on the configured application host.
pub fn validate_notebook_url(url: &str, base_url: &str) -> Result<()> {
    let url = url.trim();
    if !url.starts_with("https://") {
        return Err(NotebookError::validation(format!(
            "Notebook URL must use https: {url}"
        )));
    }
    let host = extract_host(url)?;
    let expected = extract_host(base_url)?;
    if host != expected {
        return Err(NotebookError::validation(format!(
            "Notebook URL must be on {expected}, got {host}"
        )));
    }
    let base = base_url.trim_end_matches('/');
    if !url.starts_with(base) {
        return Err(NotebookError::validation(format!(
            "Notebook URL must start with {base}"
        )));
    }
    Ok(())
}

/// Id segment of a `/notebook/<id>` link.
pub fn notebook_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/notebook/")?;
    let id = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
