//! Encrypted, domain-filtered cookie persistence.
//!
//! The cookie set is stored as one JSON-encoded [`EncryptedBlob`] file. The
//! encryption key lives in a [`KeyVault`]; it is generated on the first save
//! and reused afterwards. The domain allow-list is applied on both save and
//! load.

use super::cookie::{Cookie, filter_allowed};
use crate::config::Config;
use crate::error::{NotebookError, Result};
use crate::security::file_permissions::{ensure_secure_dir, read_secure_file, write_secure_file};
use crate::security::secrets::{self, EncryptedBlob};
use crate::security::{KeyVault, KeyringVault};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct CookieStore {
    path: PathBuf,
    vault: Arc<dyn KeyVault>,
    allowed_domains: Vec<String>,
}

impl CookieStore {
    pub fn new(
        path: impl Into<PathBuf>,
        vault: Arc<dyn KeyVault>,
        allowed_domains: Vec<String>,
    ) -> Self {
        Self {
            path: path.into(),
            vault,
            allowed_domains,
        }
    }

    /// Store at the configured location, keyed by the OS keychain.
    pub fn from_config(config: &Config) -> Self {
        let vault = KeyringVault::new(
            &config.credentials.keyring_service,
            &config.credentials.keyring_account,
        );
        Self::new(
            config.cookie_file(),
            Arc::new(vault),
            config.credentials.allowed_cookie_domains.clone(),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_cookies(&self) -> bool {
        self.path.exists()
    }

    /// Persist the allowed subset of `cookies`. Returns how many were written;
    /// zero means nothing matched and nothing was written.
    pub fn save(&self, cookies: Vec<Cookie>) -> Result<usize> {
        let total = cookies.len();
        let allowed = filter_allowed(cookies, &self.allowed_domains);
        if allowed.is_empty() {
            tracing::warn!(total, "No cookies matched the allowed domains; nothing saved");
            return Ok(0);
        }

        let key = self.get_or_create_key()?;
        let json = serde_json::to_string(&allowed)
            .map_err(|e| NotebookError::Unexpected(anyhow::anyhow!("Failed to serialize cookies: {e}")))?;
        let blob = secrets::encrypt(&json, &key)?;
        let data = serde_json::to_string_pretty(&blob)
            .map_err(|e| NotebookError::Unexpected(anyhow::anyhow!("Failed to serialize blob: {e}")))?;

        if let Some(parent) = self.path.parent() {
            ensure_secure_dir(parent)?;
        }
        write_secure_file(&self.path, &data)?;

        tracing::info!(saved = allowed.len(), dropped = total - allowed.len(), "Cookies saved");
        Ok(allowed.len())
    }

    /// Load and re-filter persisted cookies. Empty when nothing was saved.
    pub fn load(&self) -> Result<Vec<Cookie>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let key = self.vault.get()?.ok_or_else(|| {
            NotebookError::security("Encryption key missing from keychain; cookies cannot be decrypted")
        })?;

        let data = read_secure_file(&self.path)?;
        let blob: EncryptedBlob = serde_json::from_str(&data)
            .map_err(|e| NotebookError::security(format!("Cookie file is corrupt: {e}")))?;
        let json = secrets::decrypt(&blob, &key)?;
        let cookies: Vec<Cookie> = serde_json::from_str(&json)
            .map_err(|e| NotebookError::security(format!("Decrypted cookies are malformed: {e}")))?;

        Ok(filter_allowed(cookies, &self.allowed_domains))
    }

    /// Remove the cookie file and the key.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(NotebookError::security(format!(
                    "Failed to delete {}: {e}",
                    self.path.display()
                )));
            }
        }
        self.vault.delete()?;
        tracing::info!("Cookies cleared");
        Ok(())
    }

    fn get_or_create_key(&self) -> Result<String> {
        if let Some(key) = self.vault.get()? {
            return Ok(key);
        }
        let key = secrets::generate_key();
        self.vault.set(&key)?;
        tracing::debug!("Generated new cookie encryption key");
        Ok(key)
    }
}
