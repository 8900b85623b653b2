//! Platform secret store holding the cookie encryption key.

use crate::error::{NotebookError, Result};
use parking_lot::Mutex;

/// One named slot in a secret store.
pub trait KeyVault: Send + Sync {
    /// Stored value, or `None` when the entry does not exist.
    fn get(&self) -> Result<Option<String>>;

    fn set(&self, value: &str) -> Result<()>;

    /// Remove the entry. Deleting an absent entry succeeds.
    fn delete(&self) -> Result<()>;
}

/// OS keychain entry (macOS Keychain, Windows Credential Manager, Secret Service).
pub struct KeyringVault {
    service: String,
    account: String,
}

impl KeyringVault {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account).map_err(|e| {
            tracing::error!(service = %self.service, "Keychain unavailable: {e}");
            NotebookError::security(format!("Keychain unavailable: {e}"))
        })
    }
}

impl KeyVault for KeyringVault {
    fn get(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(NotebookError::security(format!(
                "Failed to read encryption key from keychain: {e}"
            ))),
        }
    }

    fn set(&self, value: &str) -> Result<()> {
        self.entry()?.set_password(value).map_err(|e| {
            NotebookError::security(format!("Failed to store encryption key in keychain: {e}"))
        })
    }

    fn delete(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(NotebookError::security(format!(
                "Failed to delete encryption key from keychain: {e}"
            ))),
        }
    }
}

/// In-process vault for tests and ephemeral use.
#[derive(Default)]
pub struct MemoryKeyVault {
    value: Mutex<Option<String>>,
}

impl MemoryKeyVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyVault for MemoryKeyVault {
    fn get(&self) -> Result<Option<String>> {
        Ok(self.value.lock().clone())
    }

    fn set(&self, value: &str) -> Result<()> {
        *self.value.lock() = Some(value.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        self.value.lock().take();
        Ok(())
    }
}
