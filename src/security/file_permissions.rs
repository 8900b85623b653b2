//! Owner-only filesystem access for credential files.
//!
//! Every helper re-checks the mode on access and repairs drift instead of
//! failing, logging a warning so the change is visible.

use crate::error::{NotebookError, Result};
use std::fs;
use std::path::Path;

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

#[cfg(unix)]
fn enforce_mode(path: &Path, expected: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|e| {
        NotebookError::security(format!("Cannot stat {}: {e}", path.display()))
    })?;
    let actual = metadata.permissions().mode() & 0o777;
    if actual != expected {
        tracing::warn!(
            path = %path.display(),
            "Fixing insecure permissions: {actual:o} -> {expected:o}"
        );
        fs::set_permissions(path, fs::Permissions::from_mode(expected)).map_err(|e| {
            NotebookError::security(format!(
                "Failed to set permissions on {}: {e}",
                path.display()
            ))
        })?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn enforce_mode(_path: &Path, _expected: u32) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
const DIR_MODE: u32 = 0;
#[cfg(not(unix))]
const FILE_MODE: u32 = 0;

/// Create `dir` (and parents) if needed and restrict it to the owner.
pub fn ensure_secure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            NotebookError::security(format!("Failed to create {}: {e}", dir.display()))
        })?;
    }
    enforce_mode(dir, DIR_MODE)
}

/// Write `data` to `path` with owner-only permissions, creating the parent
/// directory as a secure dir.
pub fn write_secure_file(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_secure_dir(parent)?;
    }
    fs::write(path, data).map_err(|e| {
        NotebookError::security(format!("Failed to write {}: {e}", path.display()))
    })?;
    enforce_mode(path, FILE_MODE)
}

/// Read `path` after verifying its permissions.
pub fn read_secure_file(path: &Path) -> Result<String> {
    enforce_mode(path, FILE_MODE)?;
    fs::read_to_string(path)
        .map_err(|e| NotebookError::security(format!("Failed to read {}: {e}", path.display())))
}
