//! Bounded pool of notebook sessions with idle eviction.
//!
//! The capacity check, eviction choice, and slot reservation happen in one
//! step under the table lock. Page I/O (cookie injection, opening, navigating,
//! closing) runs outside it, so lookups and creation for other notebooks never
//! wait on a slow page. A reserved notebook counts toward capacity until its
//! session is live or the attempt fails.

use super::browser::BrowserProvider;
use super::notebook::{NotebookSession, SessionInfo};
use crate::auth::CookieStore;
use crate::config::{Config, EndpointsConfig, SessionsConfig};
use crate::error::{NotebookError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Table {
    live: HashMap<String, Arc<NotebookSession>>,
    /// Notebooks whose session is being opened.
    pending: HashSet<String>,
}

impl Table {
    fn occupied(&self) -> usize {
        self.live.len() + self.pending.len()
    }

    fn find_by_notebook(&self, notebook_id: &str) -> Option<Arc<NotebookSession>> {
        self.live
            .values()
            .find(|s| s.notebook_id() == notebook_id)
            .cloned()
    }
}

enum Slot<'a> {
    Existing(Arc<NotebookSession>),
    /// Another task is opening this notebook; wait for it to settle.
    InFlight(tokio::sync::futures::Notified<'a>),
    Reserved(Option<Arc<NotebookSession>>),
}

struct Inner {
    browser: Arc<dyn BrowserProvider>,
    cookies: Mutex<Option<Arc<CookieStore>>>,
    endpoints: EndpointsConfig,
    settings: SessionsConfig,
    navigation_timeout: Duration,
    table: Mutex<Table>,
    settled: Notify,
}

impl Inner {
    fn idle_sessions(&self) -> Vec<Arc<NotebookSession>> {
        let threshold = self.settings.idle_timeout();
        let mut table = self.table.lock();
        let idle: Vec<String> = table
            .live
            .values()
            .filter(|s| s.is_idle(threshold))
            .map(|s| s.id().to_string())
            .collect();
        idle.iter().filter_map(|id| table.live.remove(id)).collect()
    }

    async fn cleanup_idle(&self) -> usize {
        let idle = self.idle_sessions();
        for session in &idle {
            tracing::info!(
                session_id = session.id(),
                notebook_id = session.notebook_id(),
                "Closing idle session"
            );
            session.close().await;
        }
        if !idle.is_empty() {
            tracing::info!(count = idle.len(), "Idle session sweep complete");
        }
        idle.len()
    }

    /// Reuse, wait, or reserve a slot for `notebook_id`, evicting the least
    /// recently active idle session when the table is full.
    fn claim(&self, notebook_id: &str) -> Result<Slot<'_>> {
        let mut table = self.table.lock();
        if let Some(existing) = table.find_by_notebook(notebook_id) {
            return Ok(Slot::Existing(existing));
        }
        if table.pending.contains(notebook_id) {
            // Registered before the lock is released, so the wakeup can't be missed.
            return Ok(Slot::InFlight(self.settled.notified()));
        }

        let max = self.settings.max_sessions;
        let mut evicted = None;
        if table.occupied() >= max {
            let threshold = self.settings.idle_timeout();
            let victim = table
                .live
                .values()
                .filter(|s| s.is_idle(threshold))
                .min_by_key(|s| s.last_activity())
                .map(|s| s.id().to_string())
                .ok_or(NotebookError::SessionLimit { max })?;
            evicted = table.live.remove(&victim);
        }

        table.pending.insert(notebook_id.to_string());
        Ok(Slot::Reserved(evicted))
    }
}

/// Releases a pending slot when creation finishes, fails, or is cancelled.
struct Reservation<'a> {
    inner: &'a Inner,
    notebook_id: &'a str,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.inner.table.lock().pending.remove(self.notebook_id);
        self.inner.settled.notify_waiters();
    }
}

pub struct SessionManager {
    inner: Arc<Inner>,
    sweep: Mutex<Option<CancellationToken>>,
}

impl SessionManager {
    pub fn new(
        browser: Arc<dyn BrowserProvider>,
        endpoints: EndpointsConfig,
        settings: SessionsConfig,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                browser,
                cookies: Mutex::new(None),
                endpoints,
                settings,
                navigation_timeout,
                table: Mutex::new(Table::default()),
                settled: Notify::new(),
            }),
            sweep: Mutex::new(None),
        }
    }

    pub fn from_config(browser: Arc<dyn BrowserProvider>, config: &Config) -> Self {
        Self::new(
            browser,
            config.endpoints.clone(),
            config.sessions.clone(),
            config.timeouts.navigation(),
        )
    }

    /// Inject stored cookies into the browser before each new page.
    #[must_use]
    pub fn with_cookie_store(self, store: Arc<CookieStore>) -> Self {
        *self.inner.cookies.lock() = Some(store);
        self
    }

    /// Session for `notebook_id`, reusing a live one if present.
    ///
    /// Concurrent calls for the same notebook share one session; calls for
    /// other notebooks proceed independently.
    pub async fn create_session(&self, notebook_id: &str) -> Result<Arc<NotebookSession>> {
        let inner: &Inner = &self.inner;

        let evicted = loop {
            match inner.claim(notebook_id)? {
                Slot::Existing(existing) => {
                    tracing::info!(notebook_id, session_id = existing.id(), "Reusing session");
                    return Ok(existing);
                }
                Slot::InFlight(settled) => settled.await,
                Slot::Reserved(evicted) => break evicted,
            }
        };
        let _reservation = Reservation { inner, notebook_id };

        if let Some(evicted) = evicted {
            tracing::info!(
                session_id = evicted.id(),
                notebook_id = evicted.notebook_id(),
                "Evicting idle session to make room"
            );
            evicted.close().await;
        }

        let store = inner.cookies.lock().clone();
        if let Some(store) = store {
            let cookies = store.load()?;
            if !cookies.is_empty() {
                inner.browser.inject_cookies(&cookies).await?;
            }
        }

        let session = Arc::new(NotebookSession::new(
            notebook_id,
            inner.endpoints.notebook_url(notebook_id),
            inner.navigation_timeout,
        ));
        let page = inner.browser.new_page().await?;
        session.bind_page(page);

        if let Err(e) = session.navigate().await {
            session.close().await;
            return Err(e);
        }

        inner
            .table
            .lock()
            .live
            .insert(session.id().to_string(), Arc::clone(&session));
        tracing::info!(notebook_id, session_id = session.id(), "Session created");
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Arc<NotebookSession>> {
        self.inner
            .table
            .lock()
            .live
            .get(session_id)
            .cloned()
            .ok_or_else(|| NotebookError::session(format!("Session not found: {session_id}")))
    }

    /// Record activity on a session.
    pub fn touch_session(&self, session_id: &str) -> Result<()> {
        self.get_session(session_id)?.touch();
        Ok(())
    }

    /// Close and forget a session. Returns whether it existed.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let removed = self.inner.table.lock().live.remove(session_id);
        match removed {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        let all: Vec<_> = self
            .inner
            .table
            .lock()
            .live
            .drain()
            .map(|(_, s)| s)
            .collect();
        for session in &all {
            session.close().await;
        }
        tracing::info!(count = all.len(), "All sessions closed");
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.inner
            .table
            .lock()
            .live
            .values()
            .map(|s| s.info())
            .collect()
    }

    /// Live sessions; notebooks still being opened are not counted.
    pub fn session_count(&self) -> usize {
        self.inner.table.lock().live.len()
    }

    /// Close every session idle past the threshold. Returns how many closed.
    pub async fn cleanup_idle(&self) -> usize {
        self.inner.cleanup_idle().await
    }

    /// Start the periodic idle sweep. No-op if already running.
    pub fn start_cleanup(&self) {
        let mut sweep = self.sweep.lock();
        if sweep.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let period = self.inner.settings.cleanup_interval();
        spawn_sweep(Arc::downgrade(&self.inner), period, token.clone());
        *sweep = Some(token);
        tracing::debug!(period_secs = period.as_secs(), "Idle session sweep started");
    }

    pub fn stop_cleanup(&self) {
        if let Some(token) = self.sweep.lock().take() {
            token.cancel();
        }
    }

    /// Stop the sweep, close all sessions, then the browser. Errors are logged.
    pub async fn shutdown(&self) {
        self.stop_cleanup();
        self.close_all().await;
        if let Err(e) = self.inner.browser.close().await {
            tracing::warn!("Browser close failed during shutdown: {e}");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_cleanup();
    }
}

fn spawn_sweep(inner: Weak<Inner>, period: Duration, token: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else { break };
                    inner.cleanup_idle().await;
                }
            }
        }
        tracing::debug!("Idle session sweep stopped");
    });
}
