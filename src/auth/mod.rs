//! Session credentials for the batchexecute protocol.
//!
//! - [`cookie_store::CookieStore`] keeps the browser cookie set encrypted on disk.
//! - [`headers::TokenAuthority`] turns those cookies into request headers and a
//!   cached CSRF token.
//! - [`state::AuthManager`] reports login freshness and handles logout.
//!
//! Obtaining cookies in the first place (driving a browser through the Google
//! login) happens outside this crate; its output is handed to
//! [`state::AuthManager::import_cookies`].

pub mod cookie;
pub mod cookie_store;
pub mod headers;
pub mod state;

pub use cookie::{Cookie, SameSite};
pub use cookie_store::CookieStore;
pub use headers::TokenAuthority;
pub use state::{AuthManager, AuthState};
