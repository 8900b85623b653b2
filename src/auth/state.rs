//! Cookie freshness and the high-level auth status/logout surface.

use super::cookie::Cookie;
use super::cookie_store::CookieStore;
use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Persistent cookies expiring sooner than this need a fresh login.
pub const REFRESH_THRESHOLD_SECS: f64 = 2.0 * 60.0 * 60.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthState {
    pub is_valid: bool,
    /// Earliest persistent-cookie expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
    pub needs_refresh: bool,
}

impl AuthState {
    fn invalid() -> Self {
        Self {
            is_valid: false,
            expires_at: None,
            needs_refresh: true,
        }
    }
}

/// Session cookies plus persistent cookies not yet expired at `now`.
pub fn valid_cookies(cookies: &[Cookie], now: f64) -> Vec<Cookie> {
    cookies
        .iter()
        .filter(|c| c.is_session() || c.expires > now)
        .cloned()
        .collect()
}

fn earliest_expiry(cookies: &[Cookie]) -> Option<f64> {
    cookies
        .iter()
        .filter(|c| !c.is_session())
        .map(|c| c.expires)
        .min_by(f64::total_cmp)
}

pub fn is_session_fresh(cookies: &[Cookie], now: f64) -> bool {
    if cookies.is_empty() {
        return false;
    }
    match earliest_expiry(cookies) {
        None => true,
        Some(expiry) => expiry - now > REFRESH_THRESHOLD_SECS,
    }
}

pub fn auth_state(cookies: &[Cookie], now: f64) -> AuthState {
    let valid = valid_cookies(cookies, now);
    if valid.is_empty() {
        return AuthState::invalid();
    }
    #[allow(clippy::cast_possible_truncation)]
    let expires_at = earliest_expiry(&valid)
        .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single());
    AuthState {
        is_valid: true,
        expires_at,
        needs_refresh: !is_session_fresh(&valid, now),
    }
}

fn now_secs() -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let ms = Utc::now().timestamp_millis() as f64;
    ms / 1000.0
}

/// Status, import, and logout over a [`CookieStore`].
pub struct AuthManager {
    store: Arc<CookieStore>,
}

impl AuthManager {
    pub fn new(store: Arc<CookieStore>) -> Self {
        Self { store }
    }

    /// Current state. Load failures report an invalid state instead of erroring.
    pub fn status(&self) -> AuthState {
        match self.store.load() {
            Ok(cookies) => auth_state(&cookies, now_secs()),
            Err(e) => {
                tracing::warn!("Could not load cookies for status check: {e}");
                AuthState::invalid()
            }
        }
    }

    /// Persist cookies captured by an external login flow.
    pub fn import_cookies(&self, cookies: Vec<Cookie>) -> Result<usize> {
        self.store.save(cookies)
    }

    pub fn logout(&self) -> Result<()> {
        self.store.clear()
    }
}
