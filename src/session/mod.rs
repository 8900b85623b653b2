//! Browser-backed notebook sessions.
//!
//! A [`SessionManager`] keeps at most `max_sessions` pages open, one per
//! notebook, and closes the ones left idle. Page automation itself comes from
//! a [`BrowserProvider`] implementation supplied by the embedding application.

pub mod browser;
pub mod manager;
pub mod notebook;

pub use browser::{AutomationPage, BrowserProvider};
pub use manager::SessionManager;
pub use notebook::{NotebookSession, SessionInfo};
