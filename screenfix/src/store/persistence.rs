// Persistence helpers shared by the task log and the daemon state record
// Whole-file replacement goes through write-to-temp + rename; read-modify-write
// sequences hold an advisory lock on a sidecar file.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Atomically save data to a file using write-to-temp + rename
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    // Create temp file in same directory to ensure same filesystem for rename
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown"),
        std::process::id()
    ));

    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}

/// Path of the sidecar lock file guarding `path`
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Run `f` while holding an exclusive advisory lock for `path`
///
/// The lock only excludes other callers of this function; it does not stop a
/// writer that ignores it.
pub fn with_file_lock<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let lock_file_path = lock_path(path);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_file_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_file_path.display()))?;

    lock_file
        .lock_exclusive()
        .with_context(|| format!("Failed to lock {}", lock_file_path.display()))?;

    let result = f();

    // Dropping the handle would release it too; unlock explicitly so errors surface in logs
    if let Err(e) = lock_file.unlock() {
        log::warn!("Failed to unlock {}: {}", lock_file_path.display(), e);
    }

    result
}
