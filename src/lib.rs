#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::uninlined_format_args
)]

//! Headless client for the NotebookLM batchexecute protocol.
//!
//! ```text
//! CookieStore ──▶ TokenAuthority ──▶ RpcClient / QueryClient
//!                                     └── codec (pure decoding)
//! BrowserProvider ──▶ SessionManager
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod security;
pub mod session;

pub use api::{CallOptions, CodeMapper, QueryClient, QueryRequest, QueryResult, RpcClient, rpc_ids};
pub use auth::{AuthManager, AuthState, Cookie, CookieStore, TokenAuthority};
pub use config::Config;
pub use error::{NotebookError, Result};
pub use session::{AutomationPage, BrowserProvider, NotebookSession, SessionInfo, SessionManager};
