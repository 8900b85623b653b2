//! Error taxonomy shared by every client component.
//!
//! Callers match on [`NotebookError`] variants instead of inspecting message
//! text. Each variant maps to a short category code suitable for surfacing to
//! users; cause chains stay in the logs.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotebookError>;

#[derive(Debug, Error)]
pub enum NotebookError {
    /// Missing, expired, or rejected credentials. Always fixed by logging in again.
    #[error("{0}")]
    Authentication(String),

    /// Malformed input or an unexpected non-2xx response.
    #[error("{0}")]
    Validation(String),

    /// Encryption, key-store, or file-permission failure.
    #[error("{0}")]
    Security(String),

    /// Deadline exceeded. Never retried automatically.
    #[error("{0}")]
    Timeout(String),

    /// Session not found, or session has no bound page.
    #[error("{0}")]
    Session(String),

    /// Session table is full and nothing is idle enough to evict.
    #[error("Maximum sessions ({max}) reached. Close a session first.")]
    SessionLimit { max: usize },

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl NotebookError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Stable category code.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "AUTH_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Security(_) => "SECURITY_ERROR",
            Self::Timeout(_) => "TIMEOUT_ERROR",
            Self::Session(_) | Self::SessionLimit { .. } => "SESSION_ERROR",
            Self::Unexpected(_) => "UNEXPECTED_ERROR",
        }
    }

    /// Short message without the cause chain.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unexpected(e) => format!("Unexpected error: {e}"),
            other => other.to_string(),
        }
    }

    /// Whether the RPC retry loop may try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Unexpected(_))
    }
}
