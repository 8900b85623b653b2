//! Credential protection: the cookie cipher, the OS keychain slot for its key,
//! owner-only file access, cookie/URL domain checks, and answer sanitizing.

pub mod file_permissions;
pub mod keychain;
pub mod sanitizer;
pub mod secrets;
pub mod url_validation;

pub use keychain::{KeyVault, KeyringVault, MemoryKeyVault};
pub use sanitizer::{Sanitized, sanitize};
pub use secrets::EncryptedBlob;
