use super::browser::AutomationPage;
use crate::error::{NotebookError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub notebook_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub idle_ms: u64,
}

/// One open page bound to one notebook.
pub struct NotebookSession {
    id: String,
    notebook_id: String,
    url: String,
    navigation_timeout: Duration,
    created_at: Instant,
    last_activity: Mutex<Instant>,
    page: Mutex<Option<Arc<dyn AutomationPage>>>,
}

impl std::fmt::Debug for NotebookSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookSession")
            .field("id", &self.id)
            .field("notebook_id", &self.notebook_id)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

fn wall_clock_ago(elapsed: Duration) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
}

impl NotebookSession {
    pub fn new(
        notebook_id: impl Into<String>,
        url: impl Into<String>,
        navigation_timeout: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            notebook_id: notebook_id.into(),
            url: url.into(),
            navigation_timeout,
            created_at: now,
            last_activity: Mutex::new(now),
            page: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn notebook_id(&self) -> &str {
        &self.notebook_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Strictly longer than `threshold` since the last activity.
    pub fn is_idle(&self, threshold: Duration) -> bool {
        self.last_activity().elapsed() > threshold
    }

    pub(crate) fn bind_page(&self, page: Arc<dyn AutomationPage>) {
        *self.page.lock() = Some(page);
    }

    /// Bound page; errors once the session is closed.
    pub fn page(&self) -> Result<Arc<dyn AutomationPage>> {
        self.page.lock().clone().ok_or_else(|| {
            NotebookError::session(format!(
                "Session {} has no page; it may have been closed",
                self.id
            ))
        })
    }

    pub fn is_closed(&self) -> bool {
        self.page.lock().is_none()
    }

    /// Point the page at the notebook.
    pub async fn navigate(&self) -> Result<()> {
        let page = self.page()?;
        page.goto(&self.url, self.navigation_timeout).await?;
        self.touch();
        tracing::info!(session_id = %self.id, notebook_id = %self.notebook_id, "Navigated to notebook");
        Ok(())
    }

    /// Release the page. Safe to call more than once.
    pub async fn close(&self) {
        let page = self.page.lock().take();
        if let Some(page) = page {
            if let Err(e) = page.close().await {
                tracing::debug!(session_id = %self.id, "Page close failed (ignored): {e}");
            }
            tracing::info!(session_id = %self.id, "Session closed");
        }
    }

    pub fn info(&self) -> SessionInfo {
        let idle = self.last_activity().elapsed();
        SessionInfo {
            id: self.id.clone(),
            notebook_id: self.notebook_id.clone(),
            created_at: wall_clock_ago(self.created_at.elapsed()),
            last_activity: wall_clock_ago(idle),
            idle_ms: u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
