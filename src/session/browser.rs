//! Page-automation boundary.
//!
//! Launching a browser, selectors, and typing live in an external automation
//! layer. Sessions only need a page they can point at a notebook and close.

use crate::auth::Cookie;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait AutomationPage: Send + Sync {
    /// Navigate and wait for the page to settle, failing after `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn AutomationPage>>;

    /// Cookies currently held by the browser context.
    async fn extract_cookies(&self) -> Result<Vec<Cookie>>;

    async fn inject_cookies(&self, cookies: &[Cookie]) -> Result<()>;

    /// Shut the browser down. Pages obtained earlier become unusable.
    async fn close(&self) -> Result<()>;
}
